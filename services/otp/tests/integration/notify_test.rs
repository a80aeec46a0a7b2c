use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
use bytes::{Bytes, BytesMut};
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use uuid::Uuid;

use otpgate_otp::config::{SmppSettings, TelegramSettings};
use otpgate_otp::domain::repository::CodeDispatcher;
use otpgate_otp::domain::types::Channel;
use otpgate_otp::notify::file::FileNotifier;
use otpgate_otp::notify::sms::SmsNotifier;
use otpgate_otp::notify::smpp::{
    BIND_TRANSMITTER, BindTransmitter, ENQUIRE_LINK, ENQUIRE_LINK_RESP, ESME_RINVCMDID, Pdu,
    SUBMIT_SM, SmppError, SubmitSm, UNBIND, c_octet,
};
use otpgate_otp::notify::telegram::TelegramNotifier;
use otpgate_otp::notify::{DeliveryError, NotificationDispatcher};

fn scratch_file() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("otpgate-notify-{}.txt", Uuid::new_v4()))
}

fn file_only() -> NotificationDispatcher {
    NotificationDispatcher::new(FileNotifier::new(scratch_file()))
}

// ── Telegram ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
struct FakeTelegram {
    status: StatusCode,
    received: Arc<Mutex<Vec<Value>>>,
}

async fn send_message(
    State(fake): State<FakeTelegram>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    fake.received.lock().unwrap().push(body);
    (fake.status, Json(json!({ "ok": fake.status.is_success() })))
}

async fn spawn_telegram(status: StatusCode) -> (String, Arc<Mutex<Vec<Value>>>) {
    let received = Arc::new(Mutex::new(vec![]));
    let app = Router::new()
        .route("/bottest-token/sendMessage", post(send_message))
        .with_state(FakeTelegram {
            status,
            received: Arc::clone(&received),
        });
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}"), received)
}

fn telegram(api_url: String) -> TelegramNotifier {
    TelegramNotifier::new(&TelegramSettings {
        api_url,
        token: "test-token".to_owned(),
    })
    .unwrap()
}

#[tokio::test]
async fn should_post_code_to_telegram_chat() {
    let (api_url, received) = spawn_telegram(StatusCode::OK).await;
    let dispatcher = file_only().with_telegram(telegram(api_url));

    dispatcher
        .deliver(Channel::Telegram, "987654321", "424242")
        .await
        .unwrap();

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["chat_id"], "987654321");
    assert!(received[0]["text"].as_str().unwrap().contains("424242"));
}

#[tokio::test]
async fn should_fail_on_telegram_error_status() {
    let (api_url, _) = spawn_telegram(StatusCode::FORBIDDEN).await;
    let dispatcher = file_only().with_telegram(telegram(api_url));

    let result = dispatcher
        .deliver(Channel::Telegram, "987654321", "424242")
        .await;

    assert!(
        matches!(result, Err(DeliveryError::Telegram(status)) if status == StatusCode::FORBIDDEN),
        "expected Telegram(403), got {result:?}"
    );
}

// ── SMS over SMPP ─────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Default)]
struct SmscScript {
    bind_status: u32,
    submit_status: u32,
    enquire_link: bool,
    silent: bool,
    stall_submit: bool,
}

/// Accepts one connection, answers per `script`, and returns every PDU it read.
async fn spawn_smsc(script: SmscScript) -> (u16, JoinHandle<Vec<Pdu>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = BytesMut::new();
        let mut seen = vec![];

        loop {
            let pdu = loop {
                if let Some(pdu) = Pdu::decode(&mut buf).unwrap() {
                    break Some(pdu);
                }
                match socket.read_buf(&mut buf).await {
                    Ok(0) | Err(_) => break None,
                    Ok(_) => {}
                }
            };
            let Some(pdu) = pdu else { break };
            let stalled = script.stall_submit && pdu.command_id == SUBMIT_SM;
            if script.silent || stalled || pdu.is_response() {
                seen.push(pdu);
                continue;
            }

            let reply = match pdu.command_id {
                BIND_TRANSMITTER => {
                    if script.enquire_link {
                        let enquire = Pdu::request(ENQUIRE_LINK, 900, Bytes::new());
                        socket.write_all(&enquire.encode()).await.unwrap();
                    }
                    pdu.response(script.bind_status, c_octet("fake-smsc"))
                }
                SUBMIT_SM if script.submit_status == 0 => pdu.response(0, c_octet("msg-1")),
                SUBMIT_SM => pdu.response(script.submit_status, Bytes::new()),
                UNBIND => pdu.response(0, Bytes::new()),
                _ => pdu.response(ESME_RINVCMDID, Bytes::new()),
            };
            let _ = socket.write_all(&reply.encode()).await;
            let done = pdu.command_id == UNBIND;
            seen.push(pdu);
            if done {
                break;
            }
        }
        seen
    });
    (port, handle)
}

fn smpp_settings(port: u16) -> SmppSettings {
    SmppSettings {
        host: "127.0.0.1".to_owned(),
        port,
        system_id: "otpgate".to_owned(),
        password: "secret".to_owned(),
        system_type: String::new(),
        source_addr: "OTPGATE".to_owned(),
    }
}

fn command_ids(pdus: &[Pdu]) -> Vec<u32> {
    pdus.iter().map(|p| p.command_id).collect()
}

#[tokio::test]
async fn should_bind_submit_and_unbind() {
    let (port, smsc) = spawn_smsc(SmscScript::default()).await;
    let dispatcher = file_only().with_sms(SmsNotifier::new(smpp_settings(port)));

    dispatcher
        .deliver(Channel::Sms, "+15551234567", "013579")
        .await
        .unwrap();

    let seen = smsc.await.unwrap();
    assert_eq!(command_ids(&seen), vec![BIND_TRANSMITTER, SUBMIT_SM, UNBIND]);

    let bind = BindTransmitter::decode(seen[0].body.clone()).unwrap();
    assert_eq!(bind.system_id, "otpgate");
    assert_eq!(bind.password, "secret");

    let submit = SubmitSm::decode(seen[1].body.clone()).unwrap();
    assert_eq!(submit.source_addr, "OTPGATE");
    assert_eq!(submit.destination_addr, "+15551234567");
    let text = String::from_utf8(submit.short_message.to_vec()).unwrap();
    assert!(text.contains("013579"), "{text}");
}

#[tokio::test]
async fn should_unbind_after_rejected_submit() {
    let (port, smsc) = spawn_smsc(SmscScript {
        submit_status: 0x0000_0045,
        ..Default::default()
    })
    .await;
    let dispatcher = file_only().with_sms(SmsNotifier::new(smpp_settings(port)));

    let result = dispatcher.deliver(Channel::Sms, "+15551234567", "013579").await;

    assert!(
        matches!(
            result,
            Err(DeliveryError::Smpp(SmppError::Rejected { status: 0x45, .. }))
        ),
        "expected rejected submit, got {result:?}"
    );
    let seen = smsc.await.unwrap();
    assert_eq!(command_ids(&seen), vec![BIND_TRANSMITTER, SUBMIT_SM, UNBIND]);
}

#[tokio::test]
async fn should_not_submit_when_bind_rejected() {
    let (port, smsc) = spawn_smsc(SmscScript {
        bind_status: 0x0000_000E,
        ..Default::default()
    })
    .await;
    let dispatcher = file_only().with_sms(SmsNotifier::new(smpp_settings(port)));

    let result = dispatcher.deliver(Channel::Sms, "+15551234567", "013579").await;

    assert!(
        matches!(
            result,
            Err(DeliveryError::Smpp(SmppError::Rejected {
                command_id: BIND_TRANSMITTER,
                status: 0x0E
            }))
        ),
        "expected rejected bind, got {result:?}"
    );
    let seen = smsc.await.unwrap();
    assert_eq!(command_ids(&seen), vec![BIND_TRANSMITTER]);
}

#[tokio::test]
async fn should_answer_enquire_link_mid_exchange() {
    let (port, smsc) = spawn_smsc(SmscScript {
        enquire_link: true,
        ..Default::default()
    })
    .await;
    let dispatcher = file_only().with_sms(SmsNotifier::new(smpp_settings(port)));

    dispatcher
        .deliver(Channel::Sms, "+15551234567", "013579")
        .await
        .unwrap();

    let seen = smsc.await.unwrap();
    assert_eq!(
        command_ids(&seen),
        vec![BIND_TRANSMITTER, ENQUIRE_LINK_RESP, SUBMIT_SM, UNBIND]
    );
    assert_eq!(seen[1].sequence_number, 900);
}

#[tokio::test]
async fn should_time_out_on_silent_smsc() {
    let (port, _smsc) = spawn_smsc(SmscScript {
        silent: true,
        ..Default::default()
    })
    .await;
    let notifier = SmsNotifier::new(smpp_settings(port)).with_timeout(Duration::from_millis(200));
    let dispatcher = file_only().with_sms(notifier);

    let result = dispatcher.deliver(Channel::Sms, "+15551234567", "013579").await;

    assert!(
        matches!(result, Err(DeliveryError::Smpp(SmppError::Timeout))),
        "expected timeout, got {result:?}"
    );
}

#[tokio::test]
async fn should_unbind_after_submit_times_out() {
    let (port, smsc) = spawn_smsc(SmscScript {
        stall_submit: true,
        ..Default::default()
    })
    .await;
    let notifier = SmsNotifier::new(smpp_settings(port)).with_timeout(Duration::from_millis(200));
    let dispatcher = file_only().with_sms(notifier);

    let result = dispatcher.deliver(Channel::Sms, "+15551234567", "013579").await;

    assert!(
        matches!(result, Err(DeliveryError::Smpp(SmppError::Timeout))),
        "expected timeout, got {result:?}"
    );
    let seen = smsc.await.unwrap();
    assert_eq!(command_ids(&seen), vec![BIND_TRANSMITTER, SUBMIT_SM, UNBIND]);
}

// ── File sink ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn should_append_code_to_file_sink() {
    let path = scratch_file();
    let dispatcher = NotificationDispatcher::new(FileNotifier::new(&path));

    dispatcher
        .deliver(Channel::File, "alice", "246810")
        .await
        .unwrap();

    let contents = tokio::fs::read_to_string(&path).await.unwrap();
    assert!(contents.ends_with(" - alice - OTP: 246810\n"), "{contents}");
    tokio::fs::remove_file(&path).await.unwrap();
}
