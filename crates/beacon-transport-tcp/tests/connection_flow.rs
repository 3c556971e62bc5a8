//! 连接级数据面契约：有序交付、聚集写回显、错误隔离与背压。

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use beacon_core::callbacks::ServerCallbacks;
use beacon_core::config::{BindTarget, ServerConfig};
use beacon_core::connection::Connection;
use beacon_core::error::ConnectionError;
use beacon_transport_tcp::TcpServer;
use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// 轮询等待条件成立，超时即失败。
async fn wait_until(what: &str, deadline: Duration, mut cond: impl FnMut() -> bool) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < deadline, "等待超时: {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// 验证单连接内的到达序与离散交付。
///
/// # 测试目标（Why）
/// - N 段离散发送必须产生 N 次 `on_read`，且相对顺序与网络到达序
///   一致（单连接回调全序契约）。
///
/// # 测试步骤（How）
/// 1. 消费方把每段入站字节原样记录；
/// 2. 客户端以小间隔发送 8 段可区分的数据；
/// 3. 等待总字节数到齐后，断言段数与拼接内容。
#[tokio::test]
async fn discrete_chunks_are_delivered_in_arrival_order() {
    let seen: Arc<Mutex<Vec<Bytes>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callbacks = ServerCallbacks::new(move |_conn, data| {
        sink.lock().expect("seen lock").push(data);
        Ok(())
    });

    let config = ServerConfig::new(BindTarget::ip("127.0.0.1", 0));
    let server = TcpServer::new(config, callbacks);
    let channel = server.listen().await.expect("bootstrap must succeed");
    let addr = channel.local_addr().as_ip().expect("ip addr");

    let mut client = TcpStream::connect(addr).await.expect("connect");
    let mut expected = Vec::new();
    for i in 0..8 {
        let chunk = format!("chunk-{i};");
        expected.extend_from_slice(chunk.as_bytes());
        client.write_all(chunk.as_bytes()).await.expect("send");
        // 间隔发送，保持数据段在网络上离散
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    let total = expected.len();
    let probe = Arc::clone(&seen);
    wait_until("全部数据段到达", Duration::from_secs(5), move || {
        probe
            .lock()
            .expect("seen lock")
            .iter()
            .map(Bytes::len)
            .sum::<usize>()
            == total
    })
    .await;

    let seen = seen.lock().expect("seen lock");
    assert_eq!(seen.len(), 8, "8 段离散数据应产生 8 次 on_read");
    let joined: Vec<u8> = seen.iter().flat_map(|b| b.iter().copied()).collect();
    assert_eq!(joined, expected, "交付顺序必须与到达序一致");
}

/// 验证批次刷新的回显路径与 `on_write` 观测回调。
#[tokio::test]
async fn echo_flushes_at_batch_boundaries_and_reports_writes() {
    let written = Arc::new(AtomicUsize::new(0));
    let observed = Arc::clone(&written);
    let callbacks = ServerCallbacks::new(|conn, data| conn.write(data))
        .with_on_write(move |_conn, data| {
            observed.fetch_add(data.len(), Ordering::SeqCst);
        });

    let config = ServerConfig::new(BindTarget::ip("127.0.0.1", 0));
    let server = TcpServer::new(config, callbacks);
    let channel = server.listen().await.expect("bootstrap must succeed");
    let addr = channel.local_addr().as_ip().expect("ip addr");

    let mut client = TcpStream::connect(addr).await.expect("connect");
    client.write_all(b"hello beacon").await.expect("send");
    let mut buf = [0u8; 12];
    client.read_exact(&mut buf).await.expect("echo");
    assert_eq!(&buf, b"hello beacon");

    let probe = Arc::clone(&written);
    wait_until("出站观测回调", Duration::from_secs(5), move || {
        probe.load(Ordering::SeqCst) == 12
    })
    .await;
}

/// 验证连接级错误隔离。
///
/// # 测试目标（Why）
/// - 消费方回调抛出的解码失败触发 `on_error` 恰好一次，随后该连接
///   关闭；
/// - 同一监听器上的同级连接继续正常收发。
#[tokio::test]
async fn consumer_error_closes_only_the_faulty_connection() {
    let errors: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let error_sink = Arc::clone(&errors);
    let callbacks = ServerCallbacks::new(|conn, data| {
        if data.starts_with(b"poison") {
            return Err(ConnectionError::decode("poison frame"));
        }
        conn.write(data)
    })
    .with_on_error(move |err| {
        error_sink
            .lock()
            .expect("errors lock")
            .push(err.code().to_owned());
    });

    let config = ServerConfig::new(BindTarget::ip("127.0.0.1", 0));
    let server = TcpServer::new(config, callbacks);
    let channel = server.listen().await.expect("bootstrap must succeed");
    let addr = channel.local_addr().as_ip().expect("ip addr");

    // 同级连接先建立，故障发生时它必须不受影响
    let mut healthy = TcpStream::connect(addr).await.expect("connect healthy");
    let mut faulty = TcpStream::connect(addr).await.expect("connect faulty");

    faulty.write_all(b"poison pill").await.expect("send poison");

    let probe = Arc::clone(&errors);
    wait_until("错误回调触发", Duration::from_secs(5), move || {
        !probe.lock().expect("errors lock").is_empty()
    })
    .await;

    // 故障连接随即关闭：读到 EOF 或连接错误都算关闭证据
    let mut buf = [0u8; 16];
    match tokio::time::timeout(Duration::from_secs(5), faulty.read(&mut buf)).await {
        Ok(Ok(0)) | Ok(Err(_)) => {}
        other => panic!("faulty connection should be closed, got {other:?}"),
    }

    // 同级连接继续回显
    healthy.write_all(b"still alive").await.expect("send healthy");
    let mut buf = [0u8; 11];
    healthy.read_exact(&mut buf).await.expect("echo healthy");
    assert_eq!(&buf, b"still alive");

    // 错误恰好观测一次，且归类为解码失败
    tokio::time::sleep(Duration::from_millis(100)).await;
    let errors = errors.lock().expect("errors lock");
    assert_eq!(errors.len(), 1, "单次故障必须恰好触发一次 on_error");
    assert_eq!(errors[0], "beacon.tcp.conn.decode_rejected");
}

/// 验证背压：出站被扣住期间入站交付暂停，排水后恢复且不丢数据。
///
/// # 测试步骤（How）
/// 1. 消费方把每段入站数据放大为 8 MiB 回显，远超内核两端缓冲之和，
///    刷新必然卡在不读数据的慢对端上；
/// 2. 客户端发送第一段后暂停读取，等首次交付发生、出站受阻；
/// 3. 客户端再发送第二段并静置：断言交付计数停在 1（读取已被扣住）；
/// 4. 客户端开始排水并读完全部回显：第二段随即交付，总字节无损。
#[tokio::test]
async fn backpressure_suspends_reads_until_the_peer_drains() {
    const AMPLIFY: usize = 8 * 1024 * 1024;

    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let callbacks = ServerCallbacks::new(move |conn, _data| {
        counter.fetch_add(1, Ordering::SeqCst);
        conn.write(Bytes::from(vec![b'x'; AMPLIFY]))
    });

    let config = ServerConfig::new(BindTarget::ip("127.0.0.1", 0));
    let server = TcpServer::new(config, callbacks);
    let channel = server.listen().await.expect("bootstrap must succeed");
    let addr = channel.local_addr().as_ip().expect("ip addr");

    let client = TcpStream::connect(addr).await.expect("connect");
    let (mut reader, mut writer) = client.into_split();

    writer.write_all(b"first").await.expect("send first");
    let probe = Arc::clone(&delivered);
    wait_until("首段交付", Duration::from_secs(5), move || {
        probe.load(Ordering::SeqCst) == 1
    })
    .await;

    // 第二段进入内核接收缓冲，但服务端此刻被出站刷新扣住
    writer.write_all(b"second").await.expect("send second");
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(
        delivered.load(Ordering::SeqCst),
        1,
        "出站未排空前不得交付新的入站数据"
    );

    // 排水：读完两段共 16 MiB 的回显
    let drain = tokio::spawn(async move {
        let mut total = 0usize;
        let mut buf = vec![0u8; 64 * 1024];
        while total < 2 * AMPLIFY {
            let n = reader.read(&mut buf).await.expect("drain read");
            assert_ne!(n, 0, "回显流不应提前结束");
            total += n;
        }
        total
    });

    let probe = Arc::clone(&delivered);
    wait_until("第二段交付", Duration::from_secs(30), move || {
        probe.load(Ordering::SeqCst) == 2
    })
    .await;

    let total = tokio::time::timeout(Duration::from_secs(30), drain)
        .await
        .expect("drain must finish")
        .expect("drain task");
    assert_eq!(total, 2 * AMPLIFY, "暂停期间的数据不得丢失");
}
