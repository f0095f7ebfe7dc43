pub mod mock_clock {
    //! 虚拟时钟推进算法与事件生命周期。
    //!
    //! # 测试目标（Why）
    //! - 到期即触发、未到期不触发，推进结束后 `now` 精确等于目标时间；
    //! - 触发顺序严格按 `fire_at`，节拍器在每个周期的整数倍时刻触发；
    //! - `stop`/`reset` 对已触发、已停止的事件安全，且可在回调内部调用。

    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, SystemTime};

    use spark_clock::{Clock, ClockError, MockClock, Timer};

    fn at(secs: u64) -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn drain(ticker: &spark_clock::Ticker) -> Vec<SystemTime> {
        std::iter::from_fn(|| ticker.try_recv().ok()).collect()
    }

    #[test]
    fn timer_fires_only_once_due() {
        let clock = MockClock::new();
        let timer = clock.timer(Duration::from_secs(10));

        clock.add(Duration::from_secs(9), &[]).expect("推进 9s");
        assert!(timer.try_recv().is_err(), "未到期的定时器不应触发");

        clock.add(Duration::from_secs(1), &[]).expect("推进 1s");
        assert_eq!(timer.try_recv(), Ok(at(10)));
        assert_eq!(clock.now(), at(10));

        clock.add(Duration::from_secs(30), &[]).expect("推进 30s");
        assert!(timer.try_recv().is_err(), "一次性定时器只触发一次");
    }

    #[test]
    fn tickers_fire_once_per_elapsed_period() {
        let clock = MockClock::new();
        let fast = clock.ticker(Duration::from_micros(1));
        let slow = clock.ticker(Duration::from_micros(3));

        let mut fast_ticks = Vec::new();
        let mut slow_ticks = Vec::new();
        for _ in 0..10 {
            clock.add(Duration::from_micros(1), &[]).expect("推进 1µs");
            fast_ticks.extend(drain(&fast));
            slow_ticks.extend(drain(&slow));
        }

        assert_eq!(fast_ticks.len(), 10);
        assert_eq!(slow_ticks.len(), 3);
        let expected: Vec<_> = [3, 6, 9]
            .iter()
            .map(|micros| SystemTime::UNIX_EPOCH + Duration::from_micros(*micros))
            .collect();
        assert_eq!(slow_ticks, expected, "节拍器应在周期整数倍时刻触发");
    }

    #[test]
    fn lagging_ticker_keeps_only_first_pending_tick() {
        let clock = MockClock::new();
        let ticker = clock.ticker(Duration::from_secs(1));
        clock.add(Duration::from_secs(5), &[]).expect("推进 5s");

        assert_eq!(drain(&ticker), vec![at(1)], "容量为 1 的通道只保留第一次未读节拍");
        assert_eq!(clock.next_timer(), Ok(at(6)), "节拍器仍按周期排期");
    }

    #[test]
    fn set_into_the_past_is_rejected() {
        let clock = MockClock::with_start(at(100));
        let timer = clock.timer(Duration::from_secs(1));

        let err = clock.set(at(50), &[]).unwrap_err();
        assert_eq!(
            err,
            ClockError::TimeRegression {
                now: at(100),
                target: at(50)
            }
        );
        assert_eq!(clock.now(), at(100), "失败的 set 不得修改当前时间");
        assert!(timer.try_recv().is_err());

        clock.set(at(101), &[]).expect("向前 set 应成功");
        assert_eq!(timer.try_recv(), Ok(at(101)));
    }

    #[test]
    fn overflowing_add_is_rejected() {
        let clock = MockClock::new();
        let err = clock.add(Duration::MAX, &[]).unwrap_err();
        assert!(matches!(err, ClockError::Overflow { .. }), "{err}");
        assert_eq!(clock.now(), SystemTime::UNIX_EPOCH);
    }

    #[test]
    fn stopped_timer_never_fires() {
        let clock = MockClock::new();
        let timer = clock.timer(Duration::from_secs(1));

        assert!(timer.stop(), "首次 stop 应报告激活");
        assert!(!timer.stop(), "重复 stop 应报告未激活");
        clock.add(Duration::from_secs(5), &[]).expect("推进 5s");
        assert!(timer.try_recv().is_err());
        assert_eq!(clock.pending_events(), 0);
    }

    #[test]
    fn stop_after_fire_reports_inactive() {
        let clock = MockClock::new();
        let timer = clock.timer(Duration::from_secs(1));
        clock.add(Duration::from_secs(1), &[]).expect("推进 1s");
        assert!(!timer.stop(), "已触发的定时器不再激活");
        assert_eq!(timer.try_recv(), Ok(at(1)));
    }

    #[test]
    fn reset_from_own_callback_rearms_without_deadlock() {
        let clock = MockClock::new();
        let fired = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<Mutex<Option<Timer>>> = Arc::new(Mutex::new(None));

        let callback_clock = clock.clone();
        let callback_fired = Arc::clone(&fired);
        let callback_slot = Arc::clone(&slot);
        let timer = clock.after_func(
            Duration::from_secs(1),
            Box::new(move || {
                let now = callback_clock.now();
                let mut fired = callback_fired.lock().expect("fired lock");
                fired.push(now);
                if fired.len() == 1 {
                    let slot = callback_slot.lock().expect("slot lock");
                    let timer = slot.as_ref().expect("timer stored before advance");
                    assert!(!timer.reset(Duration::from_secs(2)), "回调中定时器已失活");
                }
            }),
        );
        *slot.lock().expect("slot lock") = Some(timer);

        clock.add(Duration::from_secs(1), &[]).expect("推进 1s");
        assert_eq!(*fired.lock().expect("fired lock"), vec![at(1)]);

        clock.add(Duration::from_secs(2), &[]).expect("推进 2s");
        assert_eq!(
            *fired.lock().expect("fired lock"),
            vec![at(1), at(3)],
            "重置后的定时器应在 reset 时刻 + 2s 触发"
        );
    }

    #[test]
    fn stop_from_own_callback_reports_inactive() {
        let clock = MockClock::new();
        let stopped = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<Mutex<Option<Timer>>> = Arc::new(Mutex::new(None));

        let callback_stopped = Arc::clone(&stopped);
        let callback_slot = Arc::clone(&slot);
        let timer = clock.after_func(
            Duration::from_secs(1),
            Box::new(move || {
                let slot = callback_slot.lock().expect("slot lock");
                let timer = slot.as_ref().expect("timer stored before advance");
                callback_stopped
                    .lock()
                    .expect("stopped lock")
                    .push(timer.stop());
            }),
        );
        *slot.lock().expect("slot lock") = Some(timer);

        clock.add(Duration::from_secs(5), &[]).expect("推进 5s");
        assert_eq!(
            *stopped.lock().expect("stopped lock"),
            vec![false],
            "回调执行时定时器已失活，stop 返回 false 且只触发一次"
        );
        assert_eq!(clock.pending_events(), 0);
    }

    #[test]
    fn stop_from_callback_cancels_sibling() {
        let clock = MockClock::new();
        let sibling = Arc::new(Mutex::new(clock.timer(Duration::from_secs(2))));
        let stopper = Arc::clone(&sibling);
        let _first = clock.after_func(
            Duration::from_secs(1),
            Box::new(move || {
                assert!(stopper.lock().expect("sibling lock").stop());
            }),
        );

        clock.add(Duration::from_secs(3), &[]).expect("推进 3s");
        assert!(
            sibling.lock().expect("sibling lock").try_recv().is_err(),
            "被回调停止的定时器不应触发"
        );
    }

    #[test]
    fn events_fire_in_due_order_with_now_at_fire_time() {
        let clock = MockClock::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut timers = Vec::new();
        for (label, secs) in [("c", 3), ("a", 1), ("b", 2), ("a2", 1)] {
            let order = Arc::clone(&order);
            let observer = clock.clone();
            timers.push(clock.after_func(
                Duration::from_secs(secs),
                Box::new(move || {
                    order.lock().expect("order lock").push((label, observer.now()));
                }),
            ));
        }

        clock.set(at(10), &[]).expect("set 10s");
        assert_eq!(
            *order.lock().expect("order lock"),
            vec![("a", at(1)), ("a2", at(1)), ("b", at(2)), ("c", at(3))],
            "同刻事件按注册顺序触发，触发时 now 等于 fire_at"
        );
        assert_eq!(clock.now(), at(10));
    }

    #[test]
    fn reset_reactivates_fired_timer() {
        let clock = MockClock::new();
        let timer = clock.timer(Duration::from_secs(1));
        clock.add(Duration::from_secs(1), &[]).expect("推进 1s");
        assert_eq!(timer.recv(), Ok(at(1)));

        assert!(!timer.reset(Duration::from_secs(4)));
        assert!(timer.reset(Duration::from_secs(2)), "重置后的定时器处于激活状态");
        clock.add(Duration::from_secs(2), &[]).expect("推进 2s");
        assert_eq!(timer.try_recv(), Ok(at(3)));
    }

    #[test]
    fn ticker_reset_replaces_period() {
        let clock = MockClock::new();
        let ticker = clock.ticker(Duration::from_secs(5));
        assert!(ticker.reset(Duration::from_secs(2)));

        clock.add(Duration::from_secs(2), &[]).expect("推进 2s");
        assert_eq!(drain(&ticker), vec![at(2)]);
        clock.add(Duration::from_secs(2), &[]).expect("推进 2s");
        assert_eq!(drain(&ticker), vec![at(4)]);

        assert!(ticker.stop());
        assert!(!ticker.reset(Duration::from_secs(1)), "已停止的节拍器 reset 返回 false");
        clock.add(Duration::from_secs(1), &[]).expect("推进 1s");
        assert_eq!(drain(&ticker), vec![at(5)], "reset 重新启用已停止的节拍器");
    }

    #[test]
    #[should_panic(expected = "ticker period must be non-zero")]
    fn zero_period_ticker_panics() {
        let clock = MockClock::new();
        let _ticker = clock.ticker(Duration::ZERO);
    }

    #[test]
    fn since_saturates_for_future_instants() {
        let clock = MockClock::with_start(at(10));
        assert_eq!(clock.since(at(4)), Duration::from_secs(6));
        assert_eq!(clock.since(at(20)), Duration::ZERO);
    }

    #[test]
    fn next_timer_reports_earliest_pending_event() {
        let clock = MockClock::new();
        assert_eq!(clock.next_timer(), Err(ClockError::NoPendingEvents));

        let _late = clock.timer(Duration::from_secs(9));
        let early = clock.timer(Duration::from_secs(4));
        assert_eq!(clock.next_timer(), Ok(at(4)));
        assert_eq!(clock.pending_events(), 2);

        early.stop();
        assert_eq!(clock.next_timer(), Ok(at(9)));
    }

    #[test]
    fn after_channel_outlives_dropped_handle() {
        let clock = MockClock::new();
        let rx = clock.after(Duration::from_secs(2));
        let tick = clock.tick(Duration::from_secs(1));

        clock.add(Duration::from_secs(2), &[]).expect("推进 2s");
        assert_eq!(rx.try_recv(), Ok(at(2)));
        assert_eq!(tick.try_recv(), Ok(at(1)));
    }

    #[test]
    fn sleep_returns_once_clock_passes_duration() {
        let clock = MockClock::new();
        clock.expect_starts(1);
        let sleeper = clock.clone();
        let handle = thread::spawn(move || {
            sleeper.sleep(Duration::from_secs(5));
            sleeper.now()
        });

        clock.wait_for_start();
        clock.add(Duration::from_secs(5), &[]).expect("推进 5s");
        assert_eq!(handle.join().expect("sleeper thread"), at(5));
    }

    #[test]
    fn clones_share_virtual_time() {
        let clock = MockClock::default();
        let other = clock.clone();
        other.add(Duration::from_secs(3), &[]).expect("推进 3s");
        assert_eq!(clock.now(), at(3));
    }
}
