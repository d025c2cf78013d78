//! Sessions driven over a real SSH connection with a russh client.

use std::io::Write;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use keysh_core::TrustStore;
use keysh_server::config::generate_host_key;
use keysh_server::{Listener, ServerConfig};
use russh::client::{self, AuthResult};
use russh::keys::ssh_key::rand_core::OsRng;
use russh::keys::ssh_key::Algorithm;
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, PublicKey};
use russh::{Channel, ChannelMsg};
use tempfile::NamedTempFile;
use tokio::task::JoinHandle;

struct TestClient;

impl client::Handler for TestClient {
    type Error = russh::Error;

    async fn check_server_key(&mut self, _key: &PublicKey) -> Result<bool, Self::Error> {
        Ok(true)
    }
}

fn user_key() -> PrivateKey {
    PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap()
}

/// Start a server trusting `trusted` on an ephemeral loopback port.
async fn start_server(
    trusted: &PrivateKey,
) -> (SocketAddr, JoinHandle<keysh_core::Result<()>>) {
    let line = trusted.public_key().to_openssh().unwrap();
    let config = ServerConfig::new(
        "127.0.0.1:0".parse().unwrap(),
        "sh",
        TrustStore::from_openssh_lines(&line),
        generate_host_key().unwrap(),
    );
    let listener = Listener::bind(Arc::new(config)).await.unwrap();
    let addr = listener.local_addr();
    (addr, tokio::spawn(listener.run()))
}

async fn login(addr: SocketAddr, key: PrivateKey) -> (client::Handle<TestClient>, AuthResult) {
    let config = Arc::new(client::Config::default());
    let mut handle = client::connect(config, addr, TestClient).await.unwrap();
    let auth = handle
        .authenticate_publickey("tester", PrivateKeyWithHashAlg::new(Arc::new(key), None))
        .await
        .unwrap();
    (handle, auth)
}

/// Everything the server sent on one channel, in arrival order.
#[derive(Debug, Default)]
struct Transcript {
    output: Vec<u8>,
    exit_status: Option<u32>,
    status_before_eof: bool,
}

impl Transcript {
    fn text(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}

async fn read_until_close(channel: &mut Channel<client::Msg>) -> Transcript {
    let mut transcript = Transcript::default();
    let mut saw_eof = false;
    let reading = async {
        while let Some(msg) = channel.wait().await {
            match msg {
                ChannelMsg::Data { data } => transcript.output.extend_from_slice(&data),
                ChannelMsg::ExitStatus { exit_status } => {
                    transcript.exit_status = Some(exit_status);
                    transcript.status_before_eof = !saw_eof;
                }
                ChannelMsg::Eof => saw_eof = true,
                ChannelMsg::Close => break,
                _ => {}
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(10), reading)
        .await
        .expect("channel never closed");
    transcript
}

fn script(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[tokio::test]
async fn untrusted_key_is_rejected() {
    let (addr, server) = start_server(&user_key()).await;

    let (_handle, auth) = login(addr, user_key()).await;

    assert!(matches!(auth, AuthResult::Failure { .. }), "{auth:?}");
    server.abort();
}

#[tokio::test]
async fn batch_exec_returns_output_and_status() {
    let key = user_key();
    let (addr, server) = start_server(&key).await;
    let (handle, auth) = login(addr, key).await;
    assert!(matches!(auth, AuthResult::Success));

    let mut channel = handle.channel_open_session().await.unwrap();
    channel.exec(true, "echo hi").await.unwrap();
    let transcript = read_until_close(&mut channel).await;

    assert_eq!(transcript.text(), "hi\n");
    assert_eq!(transcript.exit_status, Some(0));
    server.abort();
}

#[tokio::test]
async fn exit_status_arrives_before_eof() {
    let key = user_key();
    let (addr, server) = start_server(&key).await;
    let (handle, _) = login(addr, key).await;
    let exits = script("exit 3\n");

    let mut channel = handle.channel_open_session().await.unwrap();
    channel
        .request_pty(false, "xterm", 80, 24, 0, 0, &[])
        .await
        .unwrap();
    channel
        .exec(true, format!("sh {}", exits.path().display()))
        .await
        .unwrap();
    let transcript = read_until_close(&mut channel).await;

    assert_eq!(transcript.exit_status, Some(3));
    assert!(transcript.status_before_eof);
    server.abort();
}

#[tokio::test]
async fn window_change_before_exec_sets_initial_size() {
    let key = user_key();
    let (addr, server) = start_server(&key).await;
    let (handle, _) = login(addr, key).await;
    let size = script("stty size\n");

    let mut channel = handle.channel_open_session().await.unwrap();
    channel
        .request_pty(false, "xterm", 80, 24, 0, 0, &[])
        .await
        .unwrap();
    channel.window_change(120, 40, 0, 0).await.unwrap();
    channel
        .exec(true, format!("sh {}", size.path().display()))
        .await
        .unwrap();
    let transcript = read_until_close(&mut channel).await;

    assert!(transcript.text().contains("40 120"), "{:?}", transcript.text());
    assert_eq!(transcript.exit_status, Some(0));
    server.abort();
}

#[tokio::test]
async fn second_session_channel_is_refused() {
    let key = user_key();
    let (addr, server) = start_server(&key).await;
    let (handle, _) = login(addr, key).await;

    let _first = handle.channel_open_session().await.unwrap();
    let second = handle.channel_open_session().await;

    assert!(second.is_err());
    server.abort();
}
