use furrow_core::PackedBits;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn set_get_round_trip_all_widths() {
    let mut rng = StdRng::seed_from_u64(0xACED);

    for width in 1..=64u32 {
        let mut words = vec![0u64; 8];
        let mut view = PackedBits::new(&mut words, width);
        let count = view.len().min(32);

        let max = if width == 64 {
            u64::MAX
        } else {
            (1u64 << width) - 1
        };
        let values: Vec<u64> = (0..count).map(|_| rng.random_range(0..=max)).collect();

        for (index, &value) in values.iter().enumerate() {
            view.set(index, value);
        }
        for (index, &value) in values.iter().enumerate() {
            assert_eq!(view.get(index), value, "width {width}, index {index}");
        }
    }
}

#[test]
fn entries_straddle_word_boundaries() {
    // Width 20: entry 3 occupies bits 60..80 and spans two words.
    let mut words = vec![0u64; 2];
    let mut view = PackedBits::new(&mut words, 20);

    view.set(3, 0xABCDE);
    assert_eq!(view.get(3), 0xABCDE);

    assert_eq!(words[0] >> 60, 0xE);
    assert_eq!(words[1] & 0xFFFF, 0xABCD);
}

#[test]
fn set_does_not_perturb_neighbors() {
    let mut words = vec![0u64; 4];
    let mut view = PackedBits::new(&mut words, 20);

    let values = [0xFFFFF, 0x12345, 0xFFFFF, 0xABCDE, 0xFFFFF];
    for (index, &value) in values.iter().enumerate() {
        view.set(index, value);
    }

    // Rewrite the middle entry and check the rest survived.
    view.set(2, 0);
    assert_eq!(view.get(0), 0xFFFFF);
    assert_eq!(view.get(1), 0x12345);
    assert_eq!(view.get(2), 0);
    assert_eq!(view.get(3), 0xABCDE);
    assert_eq!(view.get(4), 0xFFFFF);
}

#[test]
fn overwrite_clears_previous_value() {
    let mut words = vec![0u64; 2];
    let mut view = PackedBits::new(&mut words, 7);

    view.set(5, 0x7F);
    view.set(5, 0x01);
    assert_eq!(view.get(5), 0x01);
}

#[test]
fn values_are_masked_to_entry_width() {
    let mut words = vec![0u64; 2];
    let mut view = PackedBits::new(&mut words, 4);

    view.set(0, 0xFFFF_FFFF);
    assert_eq!(view.get(0), 0xF);
    assert_eq!(view.get(1), 0);
}

#[test]
fn width_64_entries_are_word_exact() {
    let mut words = vec![0u64; 3];
    let mut view = PackedBits::new(&mut words, 64);

    view.set(0, u64::MAX);
    view.set(1, 0x0123456789ABCDEF);
    view.set(2, 1);

    assert_eq!(view.get(0), u64::MAX);
    assert_eq!(view.get(1), 0x0123456789ABCDEF);
    assert_eq!(view.get(2), 1);
    assert_eq!(view.len(), 3);
}

#[test]
fn random_sparse_writes_survive() {
    let mut rng = StdRng::seed_from_u64(0xF00D);
    let mut words = vec![0u64; 64];
    let width = 13u32;
    let mut view = PackedBits::new(&mut words, width);

    let len = view.len();
    let mut shadow = vec![0u64; len];
    for _ in 0..2000 {
        let index = rng.random_range(0..len);
        let value = rng.random_range(0..(1u64 << width));
        view.set(index, value);
        shadow[index] = value;
    }

    for (index, &expected) in shadow.iter().enumerate() {
        assert_eq!(view.get(index), expected, "index {index}");
    }
}

#[test]
#[should_panic(expected = "entry width")]
fn zero_width_panics() {
    let mut words = vec![0u64; 1];
    let _ = PackedBits::new(&mut words, 0);
}
