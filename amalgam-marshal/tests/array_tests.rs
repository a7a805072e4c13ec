use amalgam_marshal::*;
use pretty_assertions::assert_eq;

fn read_elements(heap: &LinearHeap, array: &CharPtrArray<'_, LinearHeap>) -> Vec<String> {
    (0..array.count())
        .map(|i| {
            let slot = array.base().offset(i * POINTER_BYTES).unwrap();
            let ptr = heap.read_ptr(slot).unwrap();
            read_c_string(heap, ptr).unwrap()
        })
        .collect()
}

// ── CharPtrArray shapes ─────────────────────────────────────────

#[test]
fn absent_sequence_is_a_free_placeholder() {
    let heap = LinearHeap::new();
    {
        let array = CharPtrArray::<LinearHeap>::alloc::<&str>(&heap, None).unwrap();
        assert!(array.is_placeholder());
        assert!(array.base().is_null());
        assert_eq!(array.count(), 0);
        assert_eq!(heap.stats().allocations, 0);
    }
    assert_eq!(heap.stats().frees, 0);
    assert_eq!(heap.outstanding(), 0);
}

#[test]
fn empty_sequence_allocates_and_releases_once() {
    let heap = LinearHeap::new();
    {
        let empty: [&str; 0] = [];
        let array = CharPtrArray::alloc(&heap, Some(&empty[..])).unwrap();
        assert!(!array.is_placeholder());
        assert!(!array.base().is_null());
        assert!(array.is_empty());
        assert_eq!(heap.outstanding(), 1);
    }
    assert_eq!(heap.stats().frees, 1);
    assert_eq!(heap.outstanding(), 0);
    assert_eq!(heap.stats().invalid_frees, 0);
}

#[test]
fn populated_sequence_releases_every_element() {
    let heap = LinearHeap::new();
    {
        let values = ["alpha", "βeta", "gamma"];
        let array = CharPtrArray::alloc(&heap, Some(&values[..])).unwrap();
        assert_eq!(array.count(), 3);
        // three strings plus the pointer block
        assert_eq!(heap.outstanding(), 4);
        assert_eq!(read_elements(&heap, &array), vec!["alpha", "βeta", "gamma"]);
    }
    assert_eq!(heap.stats().frees, 4);
    assert_eq!(heap.outstanding(), 0);
    assert_eq!(heap.stats().invalid_frees, 0);
}

#[test]
fn accepts_owned_strings() {
    let heap = LinearHeap::new();
    let values = vec!["a".to_string(), "b".to_string()];
    let array = CharPtrArray::alloc(&heap, Some(values.as_slice())).unwrap();
    assert_eq!(read_elements(&heap, &array), values);
    drop(array);
    assert_eq!(heap.outstanding(), 0);
}

#[test]
fn partial_allocation_failure_releases_earlier_elements() {
    // room for the first two strings but not the third
    let heap = LinearHeap::with_limit(8);
    let values = ["abc", "def", "ghi"];
    let result = CharPtrArray::alloc(&heap, Some(&values[..]));
    assert!(matches!(result, Err(MarshalError::OutOfMemory { .. })));
    assert_eq!(heap.stats().allocations, 2);
    assert_eq!(heap.outstanding(), 0);
}

#[test]
fn block_allocation_failure_releases_elements() {
    // strings fit (2 * 2 bytes) but the 16-byte pointer block does not
    let heap = LinearHeap::with_limit(10);
    let values = ["a", "b"];
    let result = CharPtrArray::alloc(&heap, Some(&values[..]));
    assert!(result.is_err());
    assert_eq!(heap.outstanding(), 0);
}

// ── decode_string_array ─────────────────────────────────────────

fn native_string_list(heap: &LinearHeap, values: &[&str]) -> NativePtr {
    let base = heap.malloc(values.len() as u64 * POINTER_BYTES).unwrap();
    for (i, value) in values.iter().enumerate() {
        let ptr = string_to_pointer(heap, value).unwrap();
        heap.write_ptr(base.offset(i as u64 * POINTER_BYTES).unwrap(), ptr).unwrap();
    }
    base
}

#[test]
fn decode_string_array_frees_everything() {
    let heap = LinearHeap::new();
    let base = native_string_list(&heap, &["one", "two", "three"]);
    let decoded = decode_string_array(&heap, base, 3).unwrap();
    assert_eq!(decoded, vec!["one", "two", "three"]);
    assert_eq!(heap.outstanding(), 0);
}

#[test]
fn decode_empty_array() {
    let heap = LinearHeap::new();
    let base = heap.malloc(0).unwrap();
    assert!(decode_string_array(&heap, base, 0).unwrap().is_empty());
    assert_eq!(heap.outstanding(), 0);
    assert!(decode_string_array(&heap, NativePtr::NULL, 0).unwrap().is_empty());
}

#[test]
fn decode_releases_remaining_elements_after_bad_utf8() {
    let heap = LinearHeap::new();
    let base = native_string_list(&heap, &["ok", "x", "also ok"]);
    let bad = heap.read_ptr(base.offset(POINTER_BYTES).unwrap()).unwrap();
    heap.write(bad, &[0xff]).unwrap();

    let result = decode_string_array(&heap, base, 3);
    assert!(matches!(result, Err(MarshalError::InvalidUtf8(_))));
    assert_eq!(heap.outstanding(), 0);
}

#[test]
fn overflowing_count_is_out_of_bounds() {
    let heap = LinearHeap::new();
    let base = heap.malloc(POINTER_BYTES).unwrap();
    let result = decode_string_array(&heap, base, u64::MAX);
    assert!(matches!(result, Err(MarshalError::OutOfBounds { .. })));
    assert_eq!(heap.outstanding(), 0);

    let result = decode_string_array(&heap, NativePtr::NULL, u64::MAX);
    assert!(matches!(result, Err(MarshalError::OutOfBounds { .. })));
}

#[test]
fn count_past_the_block_stops_at_the_first_unreadable_slot() {
    let heap = LinearHeap::new();
    let element = string_to_pointer(&heap, "only").unwrap();
    let base = heap.malloc(POINTER_BYTES).unwrap();
    heap.write_ptr(base, element).unwrap();

    let result = decode_string_array(&heap, base, 1 << 40);
    assert!(matches!(result, Err(MarshalError::OutOfBounds { .. })));
    assert_eq!(heap.outstanding(), 0);
}
