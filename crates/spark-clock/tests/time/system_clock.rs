pub mod system_clock {
    //! 真实时钟：与虚拟时钟共享同一套 `Timer`/`Ticker` 契约。
    //!
    //! 只断言“最终发生”与“不会发生”，时长取几十毫秒，上限放宽到秒级。

    use std::sync::mpsc;
    use std::time::{Duration, Instant, SystemTime};

    use spark_clock::{Clock, SystemClock};

    const SHORT: Duration = Duration::from_millis(20);
    const PATIENCE: Duration = Duration::from_secs(5);

    #[test]
    fn timer_delivers_after_duration() {
        let clock = SystemClock::new();
        let started = Instant::now();
        let timer = clock.timer(SHORT);
        let rx = timer.receiver().expect("通道模式定时器");
        let fired_at = rx.recv_timeout(PATIENCE).expect("定时器应在期限内触发");

        assert!(started.elapsed() >= SHORT, "不得早于设定时长触发");
        assert!(fired_at <= SystemTime::now());
        assert!(!timer.stop(), "已触发的定时器不再激活");
    }

    #[test]
    fn stopped_timer_never_delivers() {
        let clock = SystemClock::new();
        let timer = clock.timer(SHORT);
        assert!(timer.stop());
        let rx = timer.receiver().expect("通道模式定时器");
        assert!(rx.recv_timeout(SHORT * 5).is_err(), "停止后不应再投递");
    }

    #[test]
    fn after_func_runs_callback_on_worker() {
        let clock = SystemClock::new();
        let (tx, rx) = mpsc::channel();
        let timer = clock.after_func(
            SHORT,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert!(timer.receiver().is_none(), "回调模式没有结果通道");
        rx.recv_timeout(PATIENCE).expect("回调应被执行");
    }

    #[test]
    fn reset_rearms_fired_timer() {
        let clock = SystemClock::new();
        let timer = clock.timer(SHORT);
        let rx = timer.receiver().expect("通道模式定时器");
        rx.recv_timeout(PATIENCE).expect("首次触发");

        assert!(!timer.reset(SHORT));
        rx.recv_timeout(PATIENCE).expect("重置后再次触发");
    }

    #[test]
    fn unrepresentable_deadline_leaves_timer_inactive() {
        let clock = SystemClock::new();
        let timer = clock.timer(Duration::MAX);
        assert!(!timer.stop(), "截止时间溢出时事件从未激活");
        assert!(timer.try_recv().is_err());

        let (tx, rx) = mpsc::channel();
        let callback = clock.after_func(
            Duration::MAX,
            Box::new(move || {
                let _ = tx.send(());
            }),
        );
        assert!(rx.recv_timeout(SHORT).is_err(), "永不到期的回调不得执行");
        assert!(!callback.reset(SHORT), "重置前处于失活状态");
        rx.recv_timeout(PATIENCE).expect("重置为可表示的时长后照常触发");
    }

    #[test]
    fn ticker_repeats_until_stopped() {
        let clock = SystemClock::new();
        let ticker = clock.ticker(Duration::from_millis(5));
        let first = ticker
            .receiver()
            .recv_timeout(PATIENCE)
            .expect("第一次节拍");
        let second = ticker
            .receiver()
            .recv_timeout(PATIENCE)
            .expect("第二次节拍");
        assert!(second >= first);

        assert!(ticker.stop());
        // 停止前可能已有一次投递在途。
        std::thread::sleep(SHORT);
        while ticker.try_recv().is_ok() {}
        assert!(
            ticker.receiver().recv_timeout(SHORT * 5).is_err(),
            "停止后不应再有节拍"
        );
    }

    #[test]
    fn sleep_and_since_follow_wall_clock() {
        let clock = SystemClock::default();
        let before = clock.now();
        clock.sleep(SHORT);
        assert!(clock.since(before) >= SHORT);
        clock.confirm();
    }

    #[test]
    fn trait_object_dispatch_works_for_both_clocks() {
        let clocks: Vec<std::sync::Arc<dyn Clock>> = vec![
            std::sync::Arc::new(SystemClock::new()),
            std::sync::Arc::new(spark_clock::MockClock::new()),
        ];
        for clock in clocks {
            let timer = clock.timer(Duration::from_secs(3600));
            assert!(timer.stop(), "新建定时器处于激活状态");
        }
    }
}
