use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use strata_app::{ApiContext, BoxError, MutateCallbacks, MutationConfig, MutationMachine};
use strata_core::{
    ApiMethod, EndpointRef, MutationEntry, MutationNotifications, MutationStatus, NotificationConfig,
    NotificationKind, NotificationSpec, StrataError, NOT_AUTHENTICATED,
};
use strata_testkit::{
    init_tracing, FixedClock, MockTransport, RecordingInvalidator, RecordingNotifier, StaticAuth,
};

const USERS_URL: &str = "http://localhost:3000/users";

struct Harness {
    transport: Arc<MockTransport>,
    notifier: Arc<RecordingNotifier>,
    invalidator: Arc<RecordingInvalidator>,
    auth: Arc<StaticAuth>,
    ctx: ApiContext,
}

fn harness() -> Harness {
    init_tracing();
    let transport = Arc::new(MockTransport::new());
    let notifier = Arc::new(RecordingNotifier::new());
    let invalidator = Arc::new(RecordingInvalidator::new());
    let auth = Arc::new(StaticAuth::logged_in());
    let ctx = ApiContext::builder()
        .transport(transport.clone())
        .notifier(notifier.clone())
        .invalidation(invalidator.clone())
        .auth(auth.clone())
        .clock(Arc::new(FixedClock::new(1_000)))
        .build()
        .unwrap();
    Harness {
        transport,
        notifier,
        invalidator,
        auth,
        ctx,
    }
}

fn create_user() -> MutationConfig {
    MutationConfig::new(EndpointRef::new("api", "users"), ApiMethod::Post).invalidate(["users", "stats"])
}

#[tokio::test]
async fn create_user_success_records_pending_then_success() {
    let h = harness();
    let gate = h.transport.gate(USERS_URL);
    let machine = MutationMachine::new("createUser", create_user(), h.ctx.clone());

    let running = {
        let machine = machine.clone();
        tokio::spawn(async move {
            machine
                .execute(json!({"name": "Ada"}), MutateCallbacks::default())
                .await
        })
    };
    h.transport.wait_for_calls(1).await;

    let pending = machine.state();
    assert_eq!(pending.status, MutationStatus::Pending);
    assert_eq!(pending.variables, Some(json!({"name": "Ada"})));
    assert_eq!(pending.submitted_at, Some(1_000));
    assert!(h.invalidator.calls().is_empty());

    gate.resolve(json!({"id": 1}));
    let result = running.await.unwrap().unwrap();
    assert_eq!(result, json!({"id": 1}));

    let done = machine.state();
    assert_eq!(done.status, MutationStatus::Success);
    assert_eq!(done.data, Some(json!({"id": 1})));
    assert_eq!(done.error, None);
    assert_eq!(h.invalidator.calls(), vec![vec!["users".to_string(), "stats".to_string()]]);

    let request = &h.transport.calls()[0];
    assert_eq!(request.method, ApiMethod::Post);
    assert_eq!(request.body, Some(json!({"name": "Ada"})));
}

#[tokio::test]
async fn create_user_failure_notifies_and_rethrows() {
    let h = harness();
    h.transport.push(USERS_URL, Err(StrataError::transport("conflict")));
    let machine = MutationMachine::new("createUser", create_user(), h.ctx.clone());

    let error = machine
        .execute(json!({"name": "Ada"}), MutateCallbacks::default())
        .await
        .unwrap_err();
    assert_eq!(error.message(), "conflict");

    let entry = machine.state();
    assert_eq!(entry.status, MutationStatus::Error);
    assert_eq!(entry.error.as_ref().map(StrataError::message), Some("conflict"));
    assert_eq!(entry.failure_count, 1);

    let shown = h.notifier.notifications();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].message, "conflict");
    assert_eq!(shown[0].kind, NotificationKind::Error);
    assert!(h.invalidator.calls().is_empty());
}

#[tokio::test]
async fn unauthorized_fails_before_transport() {
    let h = harness();
    h.auth.set_logged(false);
    let machine = MutationMachine::new("createUser", create_user(), h.ctx.clone());

    let error = machine.execute(json!({}), MutateCallbacks::default()).await.unwrap_err();
    assert_eq!(error, StrataError::not_authenticated());
    assert_eq!(error.message(), NOT_AUTHENTICATED);
    assert!(h.transport.calls().is_empty());
    assert!(machine.state().is_error());
}

#[tokio::test]
async fn test_mode_skips_transport() {
    let h = harness();
    let machine = MutationMachine::new("createUser", create_user().test_mode(), h.ctx.clone());

    let result = machine.execute(json!({"name": "Ada"}), MutateCallbacks::default()).await.unwrap();
    assert_eq!(result, json!("test"));
    assert!(h.transport.calls().is_empty());
    assert_eq!(h.invalidator.prefixes(), vec!["users", "stats"]);
}

#[tokio::test]
async fn hooks_run_in_order_after_success() {
    let h = harness();
    let order = Arc::new(Mutex::new(Vec::<String>::new()));

    let config = {
        let (o1, o2) = (order.clone(), order.clone());
        create_user()
            .notifications(MutationNotifications {
                success: Some(NotificationSpec::derived(|res: &Value| {
                    NotificationConfig::message(format!("Created #{}", res["id"]))
                })),
                error: None,
            })
            .on_success(move |data, vars| o1.lock().push(format!("config {} {}", data["id"], vars["name"])))
            .on_state_change(move |entry: &MutationEntry| o2.lock().push(format!("state {}", entry.status)))
    };
    h.transport.on(USERS_URL, Ok(json!({"id": 7})));
    let machine = MutationMachine::new("createUser", config, h.ctx.clone());

    let o3 = order.clone();
    machine
        .execute(
            json!({"name": "Ada"}),
            MutateCallbacks::default().on_success(move |_, _| o3.lock().push("call".into())),
        )
        .await
        .unwrap();

    assert_eq!(
        *order.lock(),
        vec!["state pending", "state success", "config 7 \"Ada\"", "call"]
    );
    assert_eq!(h.notifier.last().unwrap().message, "Created #7");
}

#[tokio::test]
async fn custom_request_errors_are_normalized() {
    let h = harness();
    let config = create_user().custom_request(|url, method, vars| {
        Box::pin(async move {
            assert_eq!(url, USERS_URL);
            assert_eq!(method, ApiMethod::Post);
            assert_eq!(vars, json!(1));
            Err::<Value, BoxError>("".into())
        })
    });
    let machine = MutationMachine::new("createUser", config, h.ctx.clone());

    let error = machine.execute(json!(1), MutateCallbacks::default()).await.unwrap_err();
    assert_eq!(error, StrataError::unknown());
    assert_eq!(h.notifier.last().unwrap().message, "Unknown error");
}

#[tokio::test]
async fn later_completion_wins() {
    let h = harness();
    let first = h.transport.gate(USERS_URL);
    let second = h.transport.gate(USERS_URL);
    let machine = MutationMachine::new("createUser", create_user(), h.ctx.clone());

    let spawn = |vars: Value| {
        let machine = machine.clone();
        tokio::spawn(async move { machine.execute(vars, MutateCallbacks::default()).await })
    };
    let a = spawn(json!("a"));
    h.transport.wait_for_calls(1).await;
    let b = spawn(json!("b"));
    h.transport.wait_for_calls(2).await;

    second.resolve(json!("from b"));
    b.await.unwrap().unwrap();
    assert_eq!(machine.state().data, Some(json!("from b")));

    first.resolve(json!("from a"));
    a.await.unwrap().unwrap();
    assert_eq!(machine.state().data, Some(json!("from a")));
}

#[tokio::test]
async fn reset_does_not_cancel_in_flight() {
    let h = harness();
    let gate = h.transport.gate(USERS_URL);
    let machine = MutationMachine::new("createUser", create_user(), h.ctx.clone());

    let running = {
        let machine = machine.clone();
        tokio::spawn(async move { machine.execute(json!({}), MutateCallbacks::default()).await })
    };
    h.transport.wait_for_calls(1).await;

    machine.reset();
    machine.reset();
    assert_eq!(machine.state(), MutationEntry::default());

    gate.resolve(json!({"id": 2}));
    running.await.unwrap().unwrap();
    assert!(machine.state().is_success());
}

#[tokio::test]
async fn one_key_failing_leaves_another_untouched() {
    let h = harness();
    h.transport.on(USERS_URL, Ok(json!({"id": 1})));
    h.transport.on("http://localhost:3000/posts", Err(StrataError::http_status(500, "Error 500")));

    let users = MutationMachine::new("createUser", create_user(), h.ctx.clone());
    let posts = MutationMachine::new(
        "createPost",
        MutationConfig::new(EndpointRef::new("api", "posts"), ApiMethod::Post),
        h.ctx.clone(),
    );

    users.execute(json!({}), MutateCallbacks::default()).await.unwrap();
    assert!(posts.execute(json!({}), MutateCallbacks::default()).await.is_err());

    assert!(users.state().is_success());
    assert_eq!(posts.state().error.and_then(|e| e.status()), Some(500));
}
