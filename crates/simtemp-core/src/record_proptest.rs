#[cfg(test)]
mod proptest_record {
    use crate::record::*;
    use crate::source::ReadOutcome;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(2000))]

        // Property: every field, reserved flag bits included, survives a round trip
        #[test]
        fn encode_decode_round_trip(
            timestamp_ns in any::<u64>(),
            temperature_mc in any::<i32>(),
            flags in any::<u32>(),
        ) {
            let sample = Sample::new(timestamp_ns, temperature_mc, flags);
            prop_assert_eq!(decode(&encode(&sample)), sample);
        }

        // Property: anything that is not exactly one record is rejected
        #[test]
        fn wrong_lengths_rejected(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
            prop_assume!(bytes.len() != RECORD_SIZE);
            let result = Sample::try_from(bytes.as_slice());
            prop_assert_eq!(
                result,
                Err(FrameError::Length { expected: RECORD_SIZE, actual: bytes.len() })
            );
        }

        // Property: short non-empty reads are partial, never decoded
        #[test]
        fn short_reads_classified_partial(len in 1usize..RECORD_SIZE) {
            let buf = vec![0xA5u8; len];
            prop_assert_eq!(ReadOutcome::from_read(&buf), ReadOutcome::Partial(len));
        }

        // Property: the flag accessors only look at their own bit
        #[test]
        fn flag_bits_are_independent(flags in any::<u32>()) {
            let sample = Sample::new(0, 0, flags);
            prop_assert_eq!(sample.is_new(), flags & FLAG_NEW_SAMPLE != 0);
            prop_assert_eq!(sample.is_alert(), flags & FLAG_ALERT != 0);
        }
    }

    #[cfg(feature = "simulation")]
    mod synthetic {
        use super::*;
        use crate::source::SampleSource;
        use crate::source_sim::{SimConfig, SimMode, SyntheticSource};
        use std::time::Duration;

        fn mode() -> impl Strategy<Value = SimMode> {
            prop_oneof![Just(SimMode::Normal), Just(SimMode::Ramp), Just(SimMode::Noisy)]
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(64))]

            // Property: ALERT is set exactly when the temperature reaches the threshold
            #[test]
            fn alert_iff_at_or_above_threshold(
                mode in mode(),
                threshold_mc in 20_000i32..70_000,
            ) {
                let mut source = SyntheticSource::new(SimConfig {
                    sampling_ms: 1,
                    threshold_mc,
                    mode,
                });
                source.open().unwrap();
                for _ in 0..8 {
                    match source.read_one(Duration::from_millis(50)) {
                        ReadOutcome::Decoded(sample) => {
                            prop_assert!(sample.is_new());
                            prop_assert_eq!(sample.is_alert(), sample.temperature_mc() >= threshold_mc);
                        }
                        other => prop_assert!(false, "unexpected outcome {:?}", other),
                    }
                }
            }
        }

        proptest! {
            // Property: ramp rises strictly within one period and resets at its end
            #[test]
            fn ramp_rises_within_period(start in 0u64..1_000_000) {
                let period = SimMode::ramp_period();
                let base = start - start % period;
                for c in base..base + period - 1 {
                    prop_assert!(SimMode::Ramp.temperature_at(c + 1) > SimMode::Ramp.temperature_at(c));
                }
                prop_assert_eq!(SimMode::Ramp.temperature_at(base + period), 25_000);
            }

            // Property: noisy stays within +/- 2 C of its base
            #[test]
            fn noisy_is_bounded(counter in any::<u64>()) {
                let t = SimMode::Noisy.temperature_at(counter);
                prop_assert!((28_000..=32_000).contains(&t));
            }
        }
    }
}
