// tests/daemon.rs

//! WapkgQuack requests over loopback UDP

mod common;

use common::{create_distribution, package_zip, setup_repository};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::net::UdpSocket;
use wapkg::daemon::{DaemonConfig, MAX_DATAGRAM, serve};

async fn receive(client: &UdpSocket) -> String {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let (len, _) = tokio::time::timeout(Duration::from_secs(10), client.recv_from(&mut buf))
        .await
        .expect("no notification")
        .unwrap();
    String::from_utf8(buf[..len].to_vec()).unwrap()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_install_and_remove_notify_subscribers() {
    let (temp, repo) = setup_repository(None);
    create_distribution(&repo, "stock");
    let archive = package_zip(&temp.path().join("pak.zip"), "pak", 5, &[], &[("pak.txt", b"pak")]);

    let config = DaemonConfig::for_repository(&repo).with_poll_interval(Duration::from_millis(50));
    let server = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let server_addr = server.local_addr().unwrap();
    let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
    let client_port = client.local_addr().unwrap().port();

    let shutdown = Arc::new(AtomicBool::new(false));
    let serving = {
        let shutdown = shutdown.clone();
        let repo = Arc::new(repo);
        tokio::spawn(async move { serve(server, repo, &config, shutdown).await })
    };

    let subscribe = format!("wq/0.1;subscribe;127.0.0.1;{client_port}");
    client.send_to(subscribe.as_bytes(), server_addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let install = format!("wq/0.1;install;stock;{}", archive.display());
    client.send_to(install.as_bytes(), server_addr).await.unwrap();
    assert_eq!(receive(&client).await, "quack!packages-changed\ndistro/stock\npak:5\n");

    client.send_to(b"wq/0.1;packages;stock", server_addr).await.unwrap();
    assert_eq!(receive(&client).await, "quack!packages\ndistro/stock\npak:5\n");

    client.send_to(b"wq/0.1;remove;stock;pak", server_addr).await.unwrap();
    assert_eq!(receive(&client).await, "quack!packages-changed\ndistro/stock\n");

    client.send_to(b"wq/0.1;remove;stock;pak", server_addr).await.unwrap();
    assert_eq!(
        receive(&client).await,
        "quack!text\npackage removal error (pak): No such package installed\n"
    );

    client.send_to(b"wq/0.1;packages;ghost", server_addr).await.unwrap();
    assert_eq!(receive(&client).await, "quack!text\nNo such distro installed: ghost\n");

    shutdown.store(true, Ordering::SeqCst);
    serving.await.unwrap().unwrap();
}
