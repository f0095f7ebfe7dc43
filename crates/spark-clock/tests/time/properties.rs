pub mod properties {
    //! 推进算法的性质测试。
    //!
    //! - 到期即触发：单次推进 Δ 后，恰好 `delay <= Δ` 的定时器触发，且 `now == start + Δ`；
    //! - 触发顺序与 `fire_at` 一致；
    //! - 周期 p 的节拍器逐周期推进 k 次，恰好触发 k 次，取值为 p 的整数倍。

    use std::sync::{Arc, Mutex};
    use std::time::{Duration, SystemTime};

    use proptest::prelude::*;
    use spark_clock::{Clock, MockClock};

    proptest! {
        #[test]
        fn prop_timers_fire_iff_due(
            delays in proptest::collection::vec(0u64..1_000, 1..32),
            delta in 0u64..1_000,
        ) {
            let clock = MockClock::new();
            let timers: Vec<_> = delays
                .iter()
                .map(|millis| clock.timer(Duration::from_millis(*millis)))
                .collect();

            clock.add(Duration::from_millis(delta), &[]).expect("推进");
            prop_assert_eq!(clock.now(), SystemTime::UNIX_EPOCH + Duration::from_millis(delta));
            for (millis, timer) in delays.iter().zip(&timers) {
                let fired = timer.try_recv().ok();
                if *millis <= delta {
                    prop_assert_eq!(fired, Some(SystemTime::UNIX_EPOCH + Duration::from_millis(*millis)));
                } else {
                    prop_assert_eq!(fired, None);
                }
            }
        }

        #[test]
        fn prop_fire_order_follows_due_time(
            delays in proptest::collection::vec(0u64..100, 1..32),
        ) {
            let clock = MockClock::new();
            let seen = Arc::new(Mutex::new(Vec::new()));
            let _timers: Vec<_> = delays
                .iter()
                .map(|millis| {
                    let seen = Arc::clone(&seen);
                    let observer = clock.clone();
                    clock.after_func(
                        Duration::from_millis(*millis),
                        Box::new(move || seen.lock().expect("seen lock").push(observer.now())),
                    )
                })
                .collect();

            clock.add(Duration::from_millis(100), &[]).expect("推进");
            let seen = seen.lock().expect("seen lock");
            prop_assert_eq!(seen.len(), delays.len());
            prop_assert!(seen.windows(2).all(|pair| pair[0] <= pair[1]));
        }

        #[test]
        fn prop_ticker_fires_once_per_period(period_ms in 1u64..50, steps in 0u32..20) {
            let clock = MockClock::new();
            let period = Duration::from_millis(period_ms);
            let ticker = clock.ticker(period);

            let mut ticks = Vec::new();
            for _ in 0..steps {
                clock.add(period, &[]).expect("推进一个周期");
                ticks.extend(std::iter::from_fn(|| ticker.try_recv().ok()));
            }

            let expected: Vec<_> = (1..=steps)
                .map(|k| SystemTime::UNIX_EPOCH + period * k)
                .collect();
            prop_assert_eq!(ticks, expected);
        }
    }
}
