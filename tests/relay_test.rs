//! End-to-end relay test: a message submitted to one server for a foreign
//! domain is delivered to a second server over a full outbound session
//! (EHLO, STARTTLS, re-EHLO, envelope, dot-stuffed body).

mod common;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use common::{client_tls_handshake, spawn_smtp_server, LineClient};
use mailroom::dns::{MxRecord, MxResolver};
use mailroom::smtp::{EmailDeliveryClient, SmtpDeliveryClient};
use mailroom::storage::MailboxStore;
use std::net::IpAddr;
use std::sync::Arc;
use tokio::net::TcpStream;

const ALICE: &str = "alice@example.com";
const BOB: &str = "bob@example2.com";
const PASSWORD: &str = "password123";

/// Resolver that maps every domain to loopback.
struct LoopbackResolver;

#[async_trait::async_trait]
impl MxResolver for LoopbackResolver {
    async fn resolve_mx(&self, _domain: &str) -> Vec<MxRecord> {
        vec![MxRecord {
            preference: 0,
            address: IpAddr::from([127, 0, 0, 1]),
        }]
    }
}

#[tokio::test]
async fn test_relay_between_two_servers() {
    // Receiving server for example2.com.
    let (remote_addr, remote_store) = spawn_smtp_server(&[(BOB, PASSWORD)], None).await;

    // Submitting server for example.com, delivering to the receiver via the
    // loopback resolver.
    let delivery: Arc<dyn EmailDeliveryClient> = Arc::new(
        SmtpDeliveryClient::new(Arc::new(LoopbackResolver))
            .with_mx_port(remote_addr.port()),
    );
    let (local_addr, local_store) =
        spawn_smtp_server(&[(ALICE, PASSWORD)], Some(delivery)).await;

    let tcp = TcpStream::connect(local_addr).await.unwrap();
    let mut client = LineClient::new(tcp);
    client.read_line().await;

    client.send_line("STARTTLS").await;
    assert_eq!(client.read_line().await, "220 Ready to start TLS");
    let tls = client_tls_handshake(client.into_inner()).await;
    let mut client = LineClient::new(tls);

    let payload = BASE64.encode(format!("\0{}\0{}", ALICE, PASSWORD));
    client.send_line(&format!("AUTH PLAIN {}", payload)).await;
    assert_eq!(client.read_line().await, "235 Auth OK");

    client.send_line(&format!("MAIL FROM:<{}>", ALICE)).await;
    assert_eq!(client.read_line().await, "250 OK");

    // The external recipient is recorded for relay even though the reply
    // reports it unknown locally.
    client.send_line(&format!("RCPT TO:<{}>", BOB)).await;
    assert_eq!(client.read_line().await, "550 5.1.1 User unknown");

    client.send_line("DATA").await;
    assert_eq!(client.read_line().await, "354 End with <CRLF>.<CRLF>");
    client.send_line("Subject: Crossing domains").await;
    client.send_line("").await;
    client.send_line("Hello across domains").await;
    client.send_line(".").await;
    assert_eq!(client.read_line().await, "250 OK");

    client.send_line("QUIT").await;
    assert_eq!(client.read_line().await, "221 Bye");

    // The relay completed before the 250 was issued, so the remote mailbox
    // already holds exactly one copy.
    assert_eq!(remote_store.count_messages(BOB).await.unwrap(), 1);
    let message = remote_store.get_message(BOB, "0").await.unwrap().unwrap();
    assert!(message.contains("Hello across domains"));
    assert!(message.contains("From: alice@example.com"));

    // Nothing was stored locally for the foreign recipient.
    assert_eq!(local_store.count_messages(BOB).await.unwrap(), 0);
}

#[tokio::test]
async fn test_relay_preserves_leading_dots() {
    let (remote_addr, remote_store) = spawn_smtp_server(&[(BOB, PASSWORD)], None).await;

    let delivery: Arc<dyn EmailDeliveryClient> = Arc::new(
        SmtpDeliveryClient::new(Arc::new(LoopbackResolver))
            .with_mx_port(remote_addr.port()),
    );
    let (local_addr, _) = spawn_smtp_server(&[(ALICE, PASSWORD)], Some(delivery)).await;

    let tcp = TcpStream::connect(local_addr).await.unwrap();
    let mut client = LineClient::new(tcp);
    client.read_line().await;
    client.send_line("STARTTLS").await;
    client.read_line().await;
    let tls = client_tls_handshake(client.into_inner()).await;
    let mut client = LineClient::new(tls);

    let payload = BASE64.encode(format!("\0{}\0{}", ALICE, PASSWORD));
    client.send_line(&format!("AUTH PLAIN {}", payload)).await;
    client.read_line().await;

    client.send_line(&format!("MAIL FROM:<{}>", ALICE)).await;
    client.read_line().await;
    client.send_line(&format!("RCPT TO:<{}>", BOB)).await;
    client.read_line().await;
    client.send_line("DATA").await;
    client.read_line().await;
    // Stuffed on the way in, must arrive with a single leading dot.
    client.send_line("..trailing thought").await;
    client.send_line(".").await;
    assert_eq!(client.read_line().await, "250 OK");

    let message = remote_store.get_message(BOB, "0").await.unwrap().unwrap();
    assert!(message.contains("\n.trailing thought"));
    assert!(!message.contains("..trailing"));
}

#[tokio::test]
async fn test_delivery_fails_when_no_mx() {
    struct EmptyResolver;

    #[async_trait::async_trait]
    impl MxResolver for EmptyResolver {
        async fn resolve_mx(&self, _domain: &str) -> Vec<MxRecord> {
            Vec::new()
        }
    }

    let client =
        SmtpDeliveryClient::new(Arc::new(EmptyResolver));
    let accepted = client
        .send_email(
            "unroutable.example",
            ALICE,
            &[BOB.to_string()],
            "lost forever\n",
        )
        .await;
    assert!(!accepted);
}
