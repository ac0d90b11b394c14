//! Module grouping.
//!
//! An MHV4 module carries exactly four channels. The control server reports
//! channels as one flat, hardware-ordered sequence; everything presentation
//! side (tables, charts) wants them regrouped per module. One generic
//! function does the regrouping for every per-channel array — bus, device,
//! channel, on/off, polarity, voltage, current — instead of a hand copy per
//! field.
//!
//! A channel count that is not a multiple of [`MODULE_SIZE`] is a data
//! contract violation and is reported as an error; trailing channels are
//! never silently dropped or duplicated.

use crate::error::{Error, Result};

/// Number of channels per MHV4 module.
pub const MODULE_SIZE: usize = 4;

/// Regroup a flat, server-ordered sequence into per-module groups of
/// [`MODULE_SIZE`], preserving order within and across groups.
pub fn group_by_module<T: Clone>(flat: &[T]) -> Result<Vec<[T; MODULE_SIZE]>> {
    if flat.len() % MODULE_SIZE != 0 {
        return Err(Error::Protocol(format!(
            "channel count {} is not a multiple of {}",
            flat.len(),
            MODULE_SIZE
        )));
    }

    Ok(flat
        .chunks_exact(MODULE_SIZE)
        .map(|chunk| {
            [
                chunk[0].clone(),
                chunk[1].clone(),
                chunk[2].clone(),
                chunk[3].clone(),
            ]
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_preserve_order() {
        let flat: Vec<i64> = (0..8).collect();
        let groups = group_by_module(&flat).unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0], [0, 1, 2, 3]);
        assert_eq!(groups[1], [4, 5, 6, 7]);
    }

    #[test]
    fn group_then_flatten_round_trips() {
        for modules in 0..5 {
            let flat: Vec<u32> = (0..(modules * MODULE_SIZE as u32)).collect();
            let groups = group_by_module(&flat).unwrap();
            let rebuilt: Vec<u32> = groups.iter().flatten().copied().collect();
            assert_eq!(rebuilt, flat);
        }
    }

    #[test]
    fn empty_input_yields_no_groups() {
        let groups = group_by_module::<bool>(&[]).unwrap();
        assert!(groups.is_empty());
    }

    #[test]
    fn partial_module_is_a_protocol_error() {
        let flat = vec![1, 2, 3, 4, 5];
        let err = group_by_module(&flat).unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
    }

    #[test]
    fn works_for_any_element_type() {
        let bools = vec![true, false, true, false];
        let groups = group_by_module(&bools).unwrap();
        assert_eq!(groups[0], [true, false, true, false]);

        let labels = vec!["a".to_string(); 4];
        assert_eq!(group_by_module(&labels).unwrap().len(), 1);
    }
}
