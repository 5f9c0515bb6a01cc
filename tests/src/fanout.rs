use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use netprobe_core::{FanOut, FanOutError, TargetFailure};

#[tokio::test]
async fn ceiling_bounds_concurrent_probes() {
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let targets: Vec<u16> = (1..=40).collect();
    let (running_probe, peak_probe) = (running.clone(), peak.clone());
    let aggregate = FanOut::new(4)
        .run(targets, move |port: u16| {
            let running = running_probe.clone();
            let peak = peak_probe.clone();
            async move {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                u32::from(port) * 2
            }
        })
        .await
        .unwrap();

    assert_eq!(aggregate.len(), 40);
    assert!(peak.load(Ordering::SeqCst) <= 4);
    assert!(aggregate.peak_in_flight() <= 4);

    let results: Vec<(u16, u32)> = aggregate
        .into_entries()
        .into_iter()
        .map(|(port, slot)| (port, slot.unwrap()))
        .collect();
    assert_eq!(results[0], (1, 2));
    assert_eq!(results[39], (40, 80));
}

#[tokio::test]
async fn one_panicking_probe_does_not_sink_the_rest() {
    let aggregate = FanOut::new(8)
        .run(vec![1u16, 2, 3], |port: u16| async move {
            if port == 2 {
                panic!("probe for port 2 blew up");
            }
            port
        })
        .await
        .unwrap();

    assert_eq!(aggregate.count(|slot| slot.is_ok()), 2);
    let failed: Vec<u16> = aggregate
        .iter()
        .filter(|(_, slot)| matches!(slot, Err(TargetFailure::Aborted(_))))
        .map(|(port, _)| *port)
        .collect();
    assert_eq!(failed, vec![2]);
}

#[tokio::test]
async fn duplicate_targets_are_an_enumeration_error() {
    let result = FanOut::new(2).run(vec![80u16, 443, 80], |port: u16| async move { port }).await;
    assert!(matches!(result, Err(FanOutError::DuplicateTarget(_))));
}
