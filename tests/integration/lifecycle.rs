//! Connection lifecycle: heartbeat, unregister, and shutdown behavior.

use crate::*;

#[tokio::test]
async fn heartbeat_keeps_the_connection_registered() {
    let proxy = TestProxy::start(DeliveryMode::Push, test_config())
        .await
        .unwrap();
    let mut client = connect(proxy.addr).await.unwrap();
    wait_until("client registration", || proxy.connections.len() == 1).await;

    for msg_id in 0..3 {
        send_packet(&mut client, Packet::new(Command::Heartbeat, msg_id))
            .await
            .unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(proxy.connections.len(), 1);
}

#[tokio::test]
async fn unregister_removes_the_connection_from_the_set() {
    let proxy = TestProxy::start(DeliveryMode::Push, test_config())
        .await
        .unwrap();
    let mut client = connect(proxy.addr).await.unwrap();
    wait_until("client registration", || proxy.connections.len() == 1).await;

    send_packet(&mut client, Packet::new(Command::Unregister, 1))
        .await
        .unwrap();
    wait_until("client unregistered", || proxy.connections.is_empty()).await;
}

#[tokio::test]
async fn disconnect_removes_the_connection_from_the_set() {
    let proxy = TestProxy::start(DeliveryMode::Push, test_config())
        .await
        .unwrap();
    let client = connect(proxy.addr).await.unwrap();
    wait_until("client registration", || proxy.connections.len() == 1).await;

    drop(client);
    wait_until("client pruned", || proxy.connections.is_empty()).await;
}

#[tokio::test]
async fn shutdown_releases_suspended_pulls_with_empty_responses() {
    let proxy = TestProxy::start(DeliveryMode::Pull, test_config())
        .await
        .unwrap();
    let mut client = connect(proxy.addr).await.unwrap();

    send_packet(&mut client, Packet::new(Command::Pull, 910))
        .await
        .unwrap();
    wait_until("request parked", || proxy.pull_engine.depths().2 == 1).await;

    proxy.shutdown();

    let response = recv_packet(&mut client, Duration::from_secs(5)).await.unwrap();
    assert_eq!(response.cmd, Command::PullResp);
    assert_eq!(response.msg_id, 910);
    assert!(response.is_body_empty());
}
