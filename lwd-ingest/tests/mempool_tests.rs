use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use lwd_ingest::MempoolTracker;
use lwd_rpc::fake::{FakeBlock, FakeChain};
use lwd_rpc::types::VerboseTransaction;

async fn wait_until<F: Fn() -> bool>(deadline: Duration, cond: F) {
    let start = Instant::now();
    while !cond() {
        if start.elapsed() > deadline {
            panic!("condition not met within {deadline:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn push_tip(chain: &FakeChain, height: u64) {
    chain.push_block(
        height,
        FakeBlock {
            hash: format!("tip-{height}"),
            raw: vec![],
            tx: vec![],
            sapling_size: 0,
            orchard_size: 0,
        },
    );
}

#[tokio::test]
async fn stream_delivers_new_txs_then_ends_on_tip_change() {
    let fake = Arc::new(FakeChain::new());
    push_tip(&fake, 1);
    fake.push_mempool_tx(
        "txa".into(),
        VerboseTransaction {
            hex: hex::encode(b"tx-a-bytes"),
            height: None,
        },
    );
    fake.push_mempool_tx(
        "txb".into(),
        VerboseTransaction {
            hex: hex::encode(b"tx-b-bytes"),
            height: None,
        },
    );

    let tracker = Arc::new(MempoolTracker::new(fake.clone()));
    let received = Arc::new(Mutex::new(Vec::new()));

    let stream_tracker = tracker.clone();
    let stream_received = received.clone();
    let handle = tokio::spawn(async move {
        stream_tracker
            .stream_mempool(|tx| {
                stream_received.lock().unwrap().push(tx.data);
                async { Ok::<(), String>(()) }
            })
            .await
    });

    wait_until(Duration::from_secs(5), || received.lock().unwrap().len() >= 2).await;
    assert_eq!(received.lock().unwrap().len(), 2);

    fake.push_mempool_tx(
        "txc".into(),
        VerboseTransaction {
            hex: hex::encode(b"tx-c-bytes"),
            height: None,
        },
    );
    wait_until(Duration::from_secs(5), || received.lock().unwrap().len() >= 3).await;
    assert_eq!(received.lock().unwrap().len(), 3);

    // A new best block ends the stream.
    push_tip(&fake, 2);
    let result = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("stream_mempool should return once the tip changes")
        .expect("task should not panic");
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn snapshot_reflects_currently_known_mempool() {
    let fake = Arc::new(FakeChain::new());
    push_tip(&fake, 1);
    fake.push_mempool_tx(
        "txa".into(),
        VerboseTransaction {
            hex: hex::encode(b"tx-a-bytes"),
            height: None,
        },
    );

    let tracker = MempoolTracker::new(fake.clone());
    // The very first refresh only learns the current tip hash (it has none
    // to compare against yet) and returns before listing the mempool; the
    // next refresh, past the 2s poll gate, actually fetches it.
    let _ = tracker.snapshot().await;
    tokio::time::advance(Duration::from_secs(3)).await;
    let snap = tracker.snapshot().await;
    assert_eq!(snap.len(), 1);
    assert_eq!(snap[0].data, b"tx-a-bytes".to_vec());
}
