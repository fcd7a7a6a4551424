use lwd_rpc::fake::{FakeBlock, FakeChain};
use lwd_rpc::Chain;

#[tokio::test]
async fn fake_chain_serves_pushed_blocks_and_scripted_failures() {
    let chain = FakeChain::new();
    chain.push_block(
        100,
        FakeBlock {
            hash: "aa".repeat(32),
            raw: vec![1, 2, 3],
            tx: vec!["tx1".into()],
            sapling_size: 1,
            orchard_size: 0,
        },
    );

    let info = chain.get_blockchain_info().await.unwrap();
    assert_eq!(info.blocks, 100);
    assert_eq!(info.bestblockhash, "aa".repeat(32));

    let verbose = chain.get_block_verbose(100).await.unwrap();
    assert_eq!(verbose.tx, vec!["tx1".to_string()]);

    assert!(chain.get_block_verbose(101).await.unwrap_err().is_out_of_range());

    chain.fail_next("getbestblockhash", 2);
    assert!(chain.get_best_block_hash().await.is_err());
    assert!(chain.get_best_block_hash().await.is_err());
    assert!(chain.get_best_block_hash().await.is_ok());
}
