use chrono::NaiveTime;
use proptest::prelude::*;
use std::time::Duration;

use nightshade::core::curve::{
    CircadianCurveConfig, Phase, intensity_for_kelvin, target_for_seconds_until_bedtime,
};
use nightshade::core::schedule::{TimeOfDay, is_time_in_window};

fn time_strategy() -> impl Strategy<Value = NaiveTime> {
    (0u32..24, 0u32..60).prop_map(|(h, m)| NaiveTime::from_hms_opt(h, m, 0).unwrap())
}

/// Configs whose temperatures fall from daylight to deep night.
fn falling_curve_strategy() -> impl Strategy<Value = CircadianCurveConfig> {
    (1000u32..=20000, 1000u32..=20000, 1000u32..=20000, 1u64..=720, 0u64..=720).prop_map(
        |(a, b, c, evening, deep)| {
            let mut kelvins = [a, b, c];
            kelvins.sort_unstable_by(|x, y| y.cmp(x));
            CircadianCurveConfig {
                bedtime: TimeOfDay::new(23, 0).unwrap(),
                daylight_kelvin: kelvins[0],
                evening_kelvin: kelvins[1],
                deep_night_kelvin: kelvins[2],
                evening_lead: Duration::from_secs(evening * 60),
                deep_night_lead: Duration::from_secs(deep.min(evening) * 60),
            }
        },
    )
}

mod schedule_window {
    use super::*;

    proptest! {
        #[test]
        fn empty_window_never_matches(time in time_strategy(), edge in time_strategy()) {
            prop_assert!(!is_time_in_window(time, edge, edge));
        }

        #[test]
        fn start_is_inside_and_end_is_outside(start in time_strategy(), end in time_strategy()) {
            prop_assume!(start != end);
            prop_assert!(is_time_in_window(start, start, end));
            prop_assert!(!is_time_in_window(end, start, end));
        }

        /// A window and its mirror image split the day between them.
        #[test]
        fn window_and_complement_cover_the_day(
            time in time_strategy(),
            start in time_strategy(),
            end in time_strategy(),
        ) {
            prop_assume!(start != end);
            let inside = is_time_in_window(time, start, end);
            let outside = is_time_in_window(time, end, start);
            prop_assert!(inside != outside);
        }
    }
}

mod curve_shape {
    use super::*;

    proptest! {
        #[test]
        fn kelvin_never_rises_toward_bedtime(
            config in falling_curve_strategy(),
            later in 0.0f64..50_000.0,
            step in 0.0f64..5_000.0,
        ) {
            let earlier = later + step;
            let before = target_for_seconds_until_bedtime(earlier, &config);
            let after = target_for_seconds_until_bedtime(later, &config);
            prop_assert!(after.kelvin <= before.kelvin);
        }

        #[test]
        fn kelvin_stays_between_the_endpoints(
            config in falling_curve_strategy(),
            seconds in 0.0f64..90_000.0,
        ) {
            let t = target_for_seconds_until_bedtime(seconds, &config);
            prop_assert!(t.kelvin <= config.daylight_kelvin);
            prop_assert!(t.kelvin >= config.deep_night_kelvin);
            prop_assert!((0.0..=1.0).contains(&t.progress));
        }

        /// Crossing a phase boundary moves the temperature by at most one kelvin.
        #[test]
        fn phases_meet_without_a_jump(config in falling_curve_strategy()) {
            let evening = config.evening_lead.as_secs_f64();
            let deep = config.deep_night_lead.as_secs_f64();
            prop_assume!(evening > deep);

            let at_evening = target_for_seconds_until_bedtime(evening, &config);
            prop_assert_eq!(at_evening.kelvin, config.daylight_kelvin);

            let last_evening = target_for_seconds_until_bedtime(deep + 0.001, &config);
            let first_deep = target_for_seconds_until_bedtime(deep, &config);
            prop_assert_eq!(first_deep.phase, Phase::DeepNight);
            prop_assert!(last_evening.kelvin.abs_diff(first_deep.kelvin) <= 1);
        }

        /// With equal leads there is no evening phase; the window opens in deep night.
        #[test]
        fn equal_leads_start_in_deep_night(config in falling_curve_strategy()) {
            let mut config = config;
            config.deep_night_lead = config.evening_lead;
            let lead = config.evening_lead.as_secs_f64();
            let at_lead = target_for_seconds_until_bedtime(lead, &config);
            prop_assert_eq!(at_lead.phase, Phase::DeepNight);
            prop_assert_eq!(at_lead.kelvin, config.evening_kelvin);
        }

        #[test]
        fn intensity_is_a_unit_fraction(config in falling_curve_strategy(), kelvin in 0u32..25_000) {
            let intensity = intensity_for_kelvin(kelvin, &config);
            prop_assert!((0.0..=1.0).contains(&intensity));
        }
    }
}
