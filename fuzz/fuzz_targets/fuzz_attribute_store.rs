//! Fuzz target: `MeterAttributes::store` (attribute text parser)
//!
//! The first byte picks the attribute, the rest is the written text.
//!
//! Invariants checked:
//! - No panics under any byte sequence
//! - Read-only attributes always answer `ReadOnly`
//! - A rejected write leaves the attribute unchanged
//! - An accepted count write reads back as the trimmed text
//!
//! cargo fuzz run fuzz_attribute_store

#![no_main]

use std::sync::Arc;

use libfuzzer_sys::fuzz_target;
use wattmeter::error::AttributeError;
use wattmeter::meter::{Attribute, MeterAttributes, MeterState, Timestamp};

fuzz_target!(|data: &[u8]| {
    let Some((&selector, rest)) = data.split_first() else {
        return;
    };
    let Ok(text) = core::str::from_utf8(rest) else {
        return;
    };

    let attr = Attribute::ALL[usize::from(selector) % Attribute::ALL.len()];
    let attrs = MeterAttributes::new(Arc::new(MeterState::new(Timestamp::EPOCH, true)));
    attrs.write_pulse_count(12_345);
    let before = attrs.show(attr);

    match attrs.store(attr, text) {
        Ok(()) => {
            assert!(attr.is_writable());
            if attr == Attribute::PulseCount {
                let expected: u32 = text.trim().parse().expect("accepted text parses");
                assert_eq!(attrs.read_pulse_count(), expected);
            }
        }
        Err(AttributeError::ReadOnly) => assert!(!attr.is_writable()),
        Err(AttributeError::InvalidValue) => assert_eq!(attrs.show(attr), before),
        Err(AttributeError::UnknownAttribute) => unreachable!("typed store never looks up names"),
    }

    // Name lookup must cope with arbitrary names.
    let _ = attrs.store_named(text, "1");
});
