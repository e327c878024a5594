//! Pull path end-to-end: batch responses, long-poll suspension, and
//! retry-batch redelivery.

use crate::*;
use portage_core::record::RecordHeader;
use portage_core::wire::BatchIter;

fn batch_offsets(body: bytes::Bytes) -> Vec<i64> {
    BatchIter::new(body)
        .map(|entry| {
            let entry = entry.unwrap();
            RecordHeader::from_bytes(&entry.header).unwrap().offset
        })
        .collect()
}

#[tokio::test]
async fn pull_returns_queued_records_in_order() {
    let proxy = TestProxy::start(DeliveryMode::Pull, test_config())
        .await
        .unwrap();
    proxy.feed(sample_record("logs", 0, 100)).await.unwrap();
    proxy.feed(sample_record("logs", 0, 101)).await.unwrap();
    wait_until("records queued", || proxy.pull_engine.depths().0 == 2).await;

    let mut client = connect(proxy.addr).await.unwrap();
    send_packet(&mut client, Packet::new(Command::Pull, 900))
        .await
        .unwrap();

    let response = recv_packet(&mut client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(response.cmd, Command::PullResp);
    assert_eq!(response.msg_id, 900);
    assert_eq!(batch_offsets(response.body), vec![100, 101]);
    assert_eq!(proxy.pull_engine.depths().0, 0);
}

#[tokio::test]
async fn empty_pull_suspends_until_a_record_arrives() {
    let proxy = TestProxy::start(DeliveryMode::Pull, test_config())
        .await
        .unwrap();
    let mut client = connect(proxy.addr).await.unwrap();

    send_packet(&mut client, Packet::new(Command::Pull, 901))
        .await
        .unwrap();

    // Nothing queued: no response may arrive synchronously.
    assert!(recv_packet(&mut client, Duration::from_millis(200))
        .await
        .is_err());
    wait_until("request parked", || proxy.pull_engine.depths().2 == 1).await;

    proxy.feed(sample_record("logs", 1, 55)).await.unwrap();

    let response = recv_packet(&mut client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(response.msg_id, 901);
    assert_eq!(batch_offsets(response.body), vec![55]);
}

#[tokio::test]
async fn unacked_batch_is_merged_into_the_next_pull() {
    let proxy = TestProxy::start(DeliveryMode::Pull, test_config())
        .await
        .unwrap();
    proxy.feed(sample_record("logs", 0, 9)).await.unwrap();
    wait_until("record queued", || proxy.pull_engine.depths().0 == 1).await;

    let mut client = connect(proxy.addr).await.unwrap();
    send_packet(&mut client, Packet::new(Command::Pull, 902))
        .await
        .unwrap();
    let first = recv_packet(&mut client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(batch_offsets(first.body.clone()), vec![9]);

    // Never ack. The sweeper reputs the batch onto the retry queue and a
    // later pull receives the identical body.
    wait_until("batch reput", || proxy.pull_engine.depths().1 == 1).await;

    send_packet(&mut client, Packet::new(Command::Pull, 903))
        .await
        .unwrap();
    let second = recv_packet(&mut client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(second.msg_id, 903);
    assert_eq!(second.body, first.body, "retried batch body must be verbatim");
}
