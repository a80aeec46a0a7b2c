use std::sync::Arc;
use std::sync::atomic::Ordering;

use chrono::Duration;
use tokio::task::JoinSet;
use uuid::Uuid;

use otpgate_otp::domain::repository::{OtpCodeRepository, PolicyStore};
use otpgate_otp::domain::types::{Channel, OtpStatus, Policy};
use otpgate_otp::error::OtpServiceError;
use otpgate_otp::usecase::otp::MAX_CODE_ATTEMPTS;

use crate::helpers::{
    MockOtpRepo, MockPolicyStore, RecordingDispatcher, active_code, engine, test_user,
};

#[tokio::test]
async fn should_issue_code_with_policy_length_and_ttl() {
    let user = test_user();
    let repo = MockOtpRepo::empty();
    let dispatcher = RecordingDispatcher::new();
    let engine = engine(
        vec![user.clone()],
        repo.clone(),
        MockPolicyStore::new(Policy::new(8, 120).unwrap()),
        dispatcher.clone(),
    );

    let otp = engine
        .generate_and_send(user.id, "transfer-42", Channel::Email)
        .await
        .unwrap();

    assert_eq!(otp.code.len(), 8);
    assert!(otp.code.bytes().all(|b| b.is_ascii_digit()));
    assert_eq!(otp.expires_at - otp.created_at, Duration::seconds(120));
    assert_eq!(otp.status, OtpStatus::Active);
    assert_eq!(otp.operation_id, "transfer-42");

    let stored = repo.find_by_id(otp.id).await.unwrap().unwrap();
    assert_eq!(stored.code, otp.code);
    assert_eq!(stored.channel, Channel::Email);

    let deliveries = dispatcher.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].channel, Channel::Email);
    assert_eq!(deliveries[0].recipient, "alice@example.com");
    assert_eq!(deliveries[0].code, otp.code);
}

#[tokio::test]
async fn should_address_file_channel_by_username() {
    let user = test_user();
    let dispatcher = RecordingDispatcher::new();
    let engine = engine(
        vec![user.clone()],
        MockOtpRepo::empty(),
        MockPolicyStore::new(Policy::default()),
        dispatcher.clone(),
    );

    engine
        .generate_and_send(user.id, "login", Channel::File)
        .await
        .unwrap();

    assert_eq!(dispatcher.deliveries()[0].recipient, "alice");
}

#[tokio::test]
async fn should_return_not_found_for_unknown_user() {
    let repo = MockOtpRepo::empty();
    let engine = engine(
        vec![],
        repo.clone(),
        MockPolicyStore::new(Policy::default()),
        RecordingDispatcher::new(),
    );

    let result = engine
        .generate_and_send(Uuid::now_v7(), "login", Channel::Email)
        .await;

    assert!(
        matches!(result, Err(OtpServiceError::UserNotFound)),
        "expected UserNotFound, got {result:?}"
    );
    assert!(repo.codes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_reject_channel_without_address() {
    let user = test_user();
    let repo = MockOtpRepo::empty();
    let engine = engine(
        vec![user.clone()],
        repo.clone(),
        MockPolicyStore::new(Policy::default()),
        RecordingDispatcher::new(),
    );

    let result = engine
        .generate_and_send(user.id, "login", Channel::Telegram)
        .await;

    assert!(
        matches!(result, Err(OtpServiceError::UnsupportedChannel(Channel::Telegram))),
        "expected UnsupportedChannel, got {result:?}"
    );
    assert!(repo.codes.lock().unwrap().is_empty());
}

#[tokio::test]
async fn should_fail_generation_without_policy() {
    let user = test_user();
    let engine = engine(
        vec![user.clone()],
        MockOtpRepo::empty(),
        MockPolicyStore::uninitialized(),
        RecordingDispatcher::new(),
    );

    let result = engine.generate_and_send(user.id, "login", Channel::Sms).await;

    assert!(
        matches!(result, Err(OtpServiceError::PolicyNotInitialized)),
        "expected PolicyNotInitialized, got {result:?}"
    );
}

#[tokio::test]
async fn should_keep_code_active_when_delivery_fails() {
    let user = test_user();
    let repo = MockOtpRepo::empty();
    let engine = engine(
        vec![user.clone()],
        repo.clone(),
        MockPolicyStore::new(Policy::default()),
        RecordingDispatcher::failing(),
    );

    let result = engine.generate_and_send(user.id, "login", Channel::Sms).await;

    assert!(
        matches!(result, Err(OtpServiceError::DeliveryFailed(_))),
        "expected DeliveryFailed, got {result:?}"
    );
    let codes = repo.codes.lock().unwrap().clone();
    assert_eq!(codes.len(), 1);
    assert_eq!(codes[0].status, OtpStatus::Active);
}

#[tokio::test]
async fn should_validate_exactly_once() {
    let user = test_user();
    let repo = MockOtpRepo::empty();
    let engine = engine(
        vec![user.clone()],
        repo.clone(),
        MockPolicyStore::new(Policy::default()),
        RecordingDispatcher::new(),
    );
    let otp = engine
        .generate_and_send(user.id, "login", Channel::File)
        .await
        .unwrap();

    assert!(engine.validate(&otp.code).await.unwrap());
    assert!(!engine.validate(&otp.code).await.unwrap());
    assert_eq!(repo.status_of(otp.id), Some(OtpStatus::Used));
}

#[tokio::test]
async fn should_return_false_for_unknown_or_empty_code() {
    let engine = engine(
        vec![],
        MockOtpRepo::empty(),
        MockPolicyStore::new(Policy::default()),
        RecordingDispatcher::new(),
    );

    assert!(!engine.validate("000000").await.unwrap());
    assert!(!engine.validate("").await.unwrap());
}

#[tokio::test]
async fn should_reject_and_expire_code_past_expiry() {
    let user = test_user();
    let expired = active_code(user.id, "123456", Duration::seconds(-1));
    let repo = MockOtpRepo::new(vec![expired.clone()]);
    let engine = engine(
        vec![user],
        repo.clone(),
        MockPolicyStore::new(Policy::default()),
        RecordingDispatcher::new(),
    );

    assert!(!engine.validate("123456").await.unwrap());
    assert_eq!(repo.status_of(expired.id), Some(OtpStatus::Expired));
    assert!(!engine.validate("123456").await.unwrap());
}

#[tokio::test]
async fn should_reject_code_at_exact_expiry_instant() {
    let user = test_user();
    let at_edge = active_code(user.id, "654321", Duration::zero());
    let repo = MockOtpRepo::new(vec![at_edge.clone()]);
    let engine = engine(
        vec![user],
        repo.clone(),
        MockPolicyStore::new(Policy::default()),
        RecordingDispatcher::new(),
    );

    assert!(!engine.validate("654321").await.unwrap());
    assert_eq!(repo.status_of(at_edge.id), Some(OtpStatus::Expired));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn should_validate_once_under_concurrent_callers() {
    let user = test_user();
    let code = active_code(user.id, "424242", Duration::minutes(5));
    let repo = MockOtpRepo::new(vec![code.clone()]);
    let engine = Arc::new(engine(
        vec![user],
        repo.clone(),
        MockPolicyStore::new(Policy::default()),
        RecordingDispatcher::new(),
    ));

    let mut tasks = JoinSet::new();
    for _ in 0..32 {
        let engine = Arc::clone(&engine);
        tasks.spawn(async move { engine.validate("424242").await.unwrap() });
    }
    let mut successes = 0;
    while let Some(result) = tasks.join_next().await {
        if result.unwrap() {
            successes += 1;
        }
    }

    assert_eq!(successes, 1, "exactly one caller may consume the code");
    assert_eq!(repo.status_of(code.id), Some(OtpStatus::Used));
}

#[tokio::test]
async fn should_validate_fresh_code_over_stale_duplicate() {
    let user = test_user();
    let stale = active_code(user.id, "123456", Duration::seconds(-100));
    let fresh = active_code(user.id, "123456", Duration::minutes(5));
    let repo = MockOtpRepo::new(vec![stale.clone(), fresh.clone()]);
    let engine = engine(
        vec![user],
        repo.clone(),
        MockPolicyStore::new(Policy::default()),
        RecordingDispatcher::new(),
    );

    assert!(engine.validate("123456").await.unwrap());
    assert_eq!(repo.status_of(fresh.id), Some(OtpStatus::Used));
    assert_eq!(repo.status_of(stale.id), Some(OtpStatus::Active));
}

#[tokio::test]
async fn should_draw_again_when_code_is_already_active() {
    let user = test_user();
    let repo = MockOtpRepo::colliding(2);
    let dispatcher = RecordingDispatcher::new();
    let engine = engine(
        vec![user.clone()],
        repo.clone(),
        MockPolicyStore::new(Policy::default()),
        dispatcher.clone(),
    );

    let otp = engine
        .generate_and_send(user.id, "login", Channel::Email)
        .await
        .unwrap();

    assert_eq!(repo.create_attempts.load(Ordering::SeqCst), 3);
    let stored = repo.codes.lock().unwrap().clone();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, otp.id);
    let deliveries = dispatcher.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].code, otp.code);
}

#[tokio::test]
async fn should_give_up_after_repeated_collisions() {
    let user = test_user();
    let repo = MockOtpRepo::colliding(u32::MAX);
    let dispatcher = RecordingDispatcher::new();
    let engine = engine(
        vec![user.clone()],
        repo.clone(),
        MockPolicyStore::new(Policy::default()),
        dispatcher.clone(),
    );

    let result = engine
        .generate_and_send(user.id, "login", Channel::Email)
        .await;

    assert!(
        matches!(result, Err(OtpServiceError::CodeCollision)),
        "expected CodeCollision, got {result:?}"
    );
    assert_eq!(repo.create_attempts.load(Ordering::SeqCst), MAX_CODE_ATTEMPTS);
    assert!(repo.codes.lock().unwrap().is_empty());
    assert!(dispatcher.deliveries().is_empty());
}

#[tokio::test]
async fn should_not_touch_issued_codes_when_policy_changes() {
    let user = test_user();
    let repo = MockOtpRepo::empty();
    let policy = MockPolicyStore::new(Policy::new(6, 300).unwrap());
    let engine = engine(
        vec![user.clone()],
        repo.clone(),
        policy.clone(),
        RecordingDispatcher::new(),
    );

    let before = engine
        .generate_and_send(user.id, "first", Channel::File)
        .await
        .unwrap();
    policy.update(&Policy::new(4, 30).unwrap()).await.unwrap();
    let after = engine
        .generate_and_send(user.id, "second", Channel::File)
        .await
        .unwrap();

    let stored_before = repo.find_by_id(before.id).await.unwrap().unwrap();
    assert_eq!(stored_before.code.len(), 6);
    assert_eq!(stored_before.expires_at, before.expires_at);
    assert_eq!(
        stored_before.expires_at - stored_before.created_at,
        Duration::seconds(300)
    );
    assert_eq!(after.code.len(), 4);
    assert_eq!(after.expires_at - after.created_at, Duration::seconds(30));
}

#[tokio::test]
async fn should_expire_only_past_due_active_codes() {
    let user = test_user();
    let past_due = active_code(user.id, "111111", Duration::seconds(-10));
    let fresh = active_code(user.id, "222222", Duration::minutes(5));
    let mut used = active_code(user.id, "333333", Duration::seconds(-10));
    used.status = OtpStatus::Used;
    let repo = MockOtpRepo::new(vec![past_due.clone(), fresh.clone(), used.clone()]);
    let engine = engine(
        vec![user],
        repo.clone(),
        MockPolicyStore::new(Policy::default()),
        RecordingDispatcher::new(),
    );

    assert_eq!(engine.mark_expired_otps().await.unwrap(), 1);
    assert_eq!(repo.status_of(past_due.id), Some(OtpStatus::Expired));
    assert_eq!(repo.status_of(fresh.id), Some(OtpStatus::Active));
    assert_eq!(repo.status_of(used.id), Some(OtpStatus::Used));

    // A second sweep over the same data changes nothing.
    assert_eq!(engine.mark_expired_otps().await.unwrap(), 0);
    assert!(!engine.validate("111111").await.unwrap());
    assert!(engine.validate("222222").await.unwrap());
}

#[tokio::test]
async fn should_surface_storage_failure_from_sweep() {
    let repo = MockOtpRepo::empty();
    repo.fail_bulk_expire
        .store(true, std::sync::atomic::Ordering::SeqCst);
    let engine = engine(
        vec![],
        repo,
        MockPolicyStore::new(Policy::default()),
        RecordingDispatcher::new(),
    );

    let result = engine.mark_expired_otps().await;
    assert!(
        matches!(result, Err(OtpServiceError::Persistence(_))),
        "expected Persistence, got {result:?}"
    );
}
