//! Integration tests for the POP3 client.
//!
//! These tests script the server side with `tokio_test::io::Builder`
//! so every byte the client sends is checked.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use tokio_test::io::Builder;

use terabyebye_pop3::{Client, Error, MailboxStat};

const TIMEOUT: Duration = Duration::from_secs(5);

fn logged_in(builder: &mut Builder) -> &mut Builder {
    builder
        .read(b"+OK POP3 server ready\r\n")
        .write(b"USER alice@example.com\r\n")
        .read(b"+OK send PASS\r\n")
        .write(b"PASS secret\r\n")
        .read(b"+OK maildrop has 3 messages\r\n")
}

#[tokio::test]
async fn full_batch_session_commits_on_quit() {
    let mock = logged_in(&mut Builder::new())
        .write(b"STAT\r\n")
        .read(b"+OK 3 4500\r\n")
        .write(b"TOP 1 0\r\n")
        .read(b"+OK top of message follows\r\n")
        .read(b"Date: Thu, 01 Jan 2009 10:00:00 +0000\r\n")
        .read(b"Subject: first\r\n")
        .read(b"\r\n")
        .read(b".\r\n")
        .write(b"DELE 1\r\n")
        .read(b"+OK message 1 deleted\r\n")
        .write(b"DELE 2\r\n")
        .read(b"+OK message 2 deleted\r\n")
        .write(b"QUIT\r\n")
        .read(b"+OK dewey POP3 server signing off (1 messages left)\r\n")
        .build();

    let client = Client::from_stream(mock, TIMEOUT).await.unwrap();
    let mut client = client.login("alice@example.com", "secret").await.unwrap();

    assert_eq!(
        client.stat().await.unwrap(),
        MailboxStat {
            count: 3,
            size: 4500
        }
    );

    let headers = client.top(1, 0).await.unwrap();
    assert_eq!(
        headers,
        b"Date: Thu, 01 Jan 2009 10:00:00 +0000\r\nSubject: first\r\n\r\n"
    );

    client.dele(1).await.unwrap();
    client.dele(2).await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn retr_returns_unstuffed_message() {
    let mock = logged_in(&mut Builder::new())
        .write(b"RETR 2\r\n")
        .read(b"+OK 52 octets\r\n")
        .read(b"From: bob@example.com\r\n\r\n")
        .read(b"..leading dot\r\nbody\r\n.\r\n")
        .write(b"QUIT\r\n")
        .read(b"+OK bye\r\n")
        .build();

    let client = Client::from_stream(mock, TIMEOUT).await.unwrap();
    let mut client = client.login("alice@example.com", "secret").await.unwrap();

    let message = client.retr(2).await.unwrap();
    assert_eq!(
        message,
        b"From: bob@example.com\r\n\r\n.leading dot\r\nbody\r\n"
    );
    client.quit().await.unwrap();
}

#[tokio::test]
async fn rset_unmarks_before_quit() {
    let mock = logged_in(&mut Builder::new())
        .write(b"DELE 1\r\n")
        .read(b"+OK\r\n")
        .write(b"RSET\r\n")
        .read(b"+OK maildrop has 3 messages\r\n")
        .write(b"QUIT\r\n")
        .read(b"+OK\r\n")
        .build();

    let client = Client::from_stream(mock, TIMEOUT).await.unwrap();
    let mut client = client.login("alice@example.com", "secret").await.unwrap();

    client.dele(1).await.unwrap();
    client.rset().await.unwrap();
    client.quit().await.unwrap();
}

#[tokio::test]
async fn connection_drop_before_quit_reply_is_transient() {
    let mock = logged_in(&mut Builder::new())
        .write(b"DELE 1\r\n")
        .read(b"+OK\r\n")
        .write(b"QUIT\r\n")
        .build();

    let client = Client::from_stream(mock, TIMEOUT).await.unwrap();
    let mut client = client.login("alice@example.com", "secret").await.unwrap();

    client.dele(1).await.unwrap();
    let err = client.quit().await.unwrap_err();
    assert!(err.is_transient());
}

#[tokio::test]
async fn quit_reports_update_state_failure() {
    let mock = logged_in(&mut Builder::new())
        .write(b"DELE 1\r\n")
        .read(b"+OK\r\n")
        .write(b"QUIT\r\n")
        .read(b"-ERR some deleted messages not removed\r\n")
        .build();

    let client = Client::from_stream(mock, TIMEOUT).await.unwrap();
    let mut client = client.login("alice@example.com", "secret").await.unwrap();

    client.dele(1).await.unwrap();
    let err = client.quit().await.unwrap_err();
    assert!(matches!(err, Error::Server { .. }));
}

#[tokio::test]
async fn malformed_status_is_protocol_error() {
    let mock = logged_in(&mut Builder::new())
        .write(b"STAT\r\n")
        .read(b"garbage\r\n")
        .build();

    let client = Client::from_stream(mock, TIMEOUT).await.unwrap();
    let mut client = client.login("alice@example.com", "secret").await.unwrap();

    let err = client.stat().await.unwrap_err();
    assert!(matches!(err, Error::Protocol(_)));
    assert!(client.is_poisoned());
}
