//! Loopback integration tests. Every test binds port 0 and asks the
//! listener which port the OS picked, so tests can run in parallel.

use std::os::fd::IntoRawFd;
use std::thread;
use std::time::Duration;

use tcplane::{Listener, RecvError, SendError, Stream};

fn local_listener() -> (Listener, u16) {
    let listener = Listener::bind("127.0.0.1", 0).expect("bind 127.0.0.1:0");
    let port = listener.local_addr().expect("local_addr").port();
    (listener, port)
}

/// Connect with retries: a listener thread may not have reached
/// listen(2) yet when the client races it.
fn connect_patiently(port: u16) -> Stream {
    for _ in 0..50 {
        match Stream::connect("127.0.0.1", port) {
            Ok(stream) => return stream,
            Err(_) => thread::sleep(Duration::from_millis(10)),
        }
    }
    panic!("could not connect to 127.0.0.1:{port}");
}

fn send_all(stream: &Stream, mut data: &[u8]) {
    while !data.is_empty() {
        let n = stream.send(data).expect("send");
        data = &data[n..];
    }
}

fn recv_until_eof(stream: &Stream) -> Vec<u8> {
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = stream.recv(&mut buf).expect("recv");
        if n == 0 {
            return out;
        }
        out.extend_from_slice(&buf[..n]);
    }
}

#[test]
fn round_trip_survives_undersized_recv_buffers() {
    let (listener, port) = local_listener();
    listener.start_listening(16).expect("listen");

    let payload: Vec<u8> = (0..=255).collect();
    let sender = {
        let payload = payload.clone();
        thread::spawn(move || {
            let stream = connect_patiently(port);
            send_all(&stream, &payload);
        })
    };

    let peer = listener.accept().expect("accept");
    let mut received = Vec::new();
    let mut buf = [0u8; 7]; // deliberately smaller than the payload
    while received.len() < payload.len() {
        let n = peer.recv(&mut buf).expect("recv");
        assert!(n > 0, "peer closed early after {} bytes", received.len());
        received.extend_from_slice(&buf[..n]);
    }
    assert_eq!(received, payload);
    sender.join().unwrap();
}

#[test]
fn send_accepts_text_and_bytes() {
    let (listener, port) = local_listener();
    listener.start_listening(16).expect("listen");

    let client = connect_patiently(port);
    let peer = listener.accept().expect("accept");

    send_all(&client, b"bytes,");
    assert_eq!(client.send("text").expect("send str"), 4);
    drop(client);

    assert_eq!(recv_until_eof(&peer), b"bytes,text");
}

#[test]
fn recv_after_orderly_close_returns_zero() {
    let (listener, port) = local_listener();
    listener.start_listening(16).expect("listen");

    let client = connect_patiently(port);
    let peer = listener.accept().expect("accept");

    // nothing in flight, clean close: the peer must observe
    // end-of-stream, not an error
    drop(client);

    let mut buf = [0u8; 16];
    assert_eq!(peer.recv(&mut buf).expect("recv"), 0);
    // and again; end-of-stream is stable
    assert_eq!(peer.recv(&mut buf).expect("recv"), 0);
}

/// Aborts `stream` so its peer sees RST instead of FIN: linger 0
/// turns close(2) into an abortive release.
fn close_with_reset(stream: Stream) {
    let fd = stream.into_raw_fd();
    let lg = libc::linger { l_onoff: 1, l_linger: 0 };
    let rc = unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_LINGER,
            &lg as *const _ as *const libc::c_void,
            std::mem::size_of::<libc::linger>() as libc::socklen_t,
        )
    };
    assert_eq!(rc, 0, "setsockopt(SO_LINGER)");
    assert_eq!(unsafe { libc::close(fd) }, 0);
}

#[test]
fn recv_after_abrupt_reset_returns_connection_reset() {
    let (listener, port) = local_listener();
    listener.start_listening(16).expect("listen");

    let client = connect_patiently(port);
    let peer = listener.accept().expect("accept");

    close_with_reset(peer);
    thread::sleep(Duration::from_millis(100));

    let mut buf = [0u8; 16];
    match client.recv(&mut buf) {
        Err(RecvError::ConnectionReset) => {}
        other => panic!("expected ConnectionReset, got {other:?}"),
    }
}

#[test]
fn send_after_abrupt_reset_returns_connection_reset() {
    let (listener, port) = local_listener();
    listener.start_listening(16).expect("listen");

    let client = connect_patiently(port);
    let peer = listener.accept().expect("accept");

    close_with_reset(peer);
    thread::sleep(Duration::from_millis(100));

    // first syscall after the RST lands surfaces the pending error
    match client.send(b"x") {
        Err(SendError::ConnectionReset) => {}
        other => panic!("expected ConnectionReset, got {other:?}"),
    }
}

#[test]
fn listen_runs_callback_once_per_connection_in_order() {
    let (listener, port) = local_listener();

    thread::spawn(move || {
        let mut served = 0u32;
        // loop never returns; the thread is abandoned at process exit
        let _ = listener.listen(|stream| {
            served += 1;
            send_all(&stream, format!("conn-{served}").as_bytes());
        });
    });

    // strictly sequential on the client side too: each tag must match
    // the order the connections were made
    for i in 1..=5u32 {
        let client = connect_patiently(port);
        let tag = recv_until_eof(&client);
        assert_eq!(tag, format!("conn-{i}").into_bytes());
    }
}

#[test]
fn callback_can_hand_streams_to_workers() {
    let (listener, port) = local_listener();

    thread::spawn(move || {
        let _ = listener.listen(|stream| {
            // the loop stays sequential; handling doesn't
            thread::spawn(move || {
                let request = {
                    let mut buf = [0u8; 64];
                    let n = stream.recv(&mut buf).expect("recv");
                    buf[..n].to_vec()
                };
                send_all(&stream, &request);
            });
        });
    });

    let client = connect_patiently(port);
    send_all(&client, b"ping");
    client.shutdown(tcplane::Shutdown::Write).expect("shutdown");
    assert_eq!(recv_until_eof(&client), b"ping");
}

#[test]
fn into_raw_fd_releases_descriptor_without_shutdown() {
    let (listener, port) = local_listener();
    listener.start_listening(16).expect("listen");

    let client = connect_patiently(port);
    let peer = listener.accept().expect("accept");

    // the fd leaves the Stream un-shutdown and stays usable
    let fd = client.into_raw_fd();
    let n = unsafe { libc::send(fd, b"x".as_ptr() as *const libc::c_void, 1, libc::MSG_NOSIGNAL) };
    assert_eq!(n, 1);

    let mut buf = [0u8; 4];
    assert_eq!(peer.recv(&mut buf).expect("recv"), 1);
    assert_eq!(&buf[..1], b"x");

    assert_eq!(unsafe { libc::close(fd) }, 0);
}

#[test]
fn listener_reports_peer_and_local_addr() {
    let (listener, port) = local_listener();
    listener.start_listening(16).expect("listen");

    let client = connect_patiently(port);
    let peer = listener.accept().expect("accept");

    assert_eq!(client.peer_addr().expect("peer_addr").port(), port);
    assert_eq!(peer.local_addr().expect("local_addr").port(), port);
    assert_eq!(
        client.local_addr().expect("local_addr").port(),
        peer.peer_addr().expect("peer_addr").port()
    );
}
