//! Tests for the bound-operation lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use horizon_lattice_query::mock::{HandleEvent, MockEngine};
use horizon_lattice_query::{
    BindingConfig, BindingError, Context, FetchPolicy, LifecycleState, MutationCall, Operation,
    Props, QueryError, QueryHandle, QueryOptions, QueryProvider, QueryResult,
};
use serde_json::{Value, json};

struct Profile;
struct SaveButton;
struct Feed;

fn props(value: Value) -> Props {
    match value {
        Value::Object(map) => map,
        _ => panic!("props must be an object"),
    }
}

fn profile_query() -> Operation {
    Operation::query("query GetUser($id: ID!) { user(id: $id) { name } }")
        .named("GetUser")
        .required_variable("id")
}

fn setup() -> (MockEngine, QueryProvider) {
    let engine = MockEngine::new();
    let provider = QueryProvider::new(Arc::new(engine.clone()));
    (engine, provider)
}

#[test]
fn test_missing_required_variable_fails_render() {
    let (engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        Props::new(),
        Context::new(),
    );

    let err = binding.render().unwrap_err();
    assert_eq!(err.missing_variable_name(), Some("id"));
    assert!(err.to_string().contains("'GraphQL(Profile)'"));
    assert_eq!(engine.handle_count(), 0);
}

#[test]
fn test_variables_reach_the_engine() {
    let (engine, provider) = setup();
    let op = profile_query().variable("locale");
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(op),
        props(json!({"id": "42"})),
        Context::new(),
    );
    binding.render().unwrap();

    let handle = engine.last_handle().unwrap();
    assert_eq!(
        handle.request().options.variables,
        Some(props(json!({"id": "42", "locale": null})))
    );
    assert_eq!(
        handle.request().metadata,
        Some(json!({"component": {"displayName": "GraphQL(Profile)"}}))
    );
}

#[test]
fn test_render_before_mount_does_not_subscribe() {
    let (engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );

    let child = binding.render().unwrap();
    assert!(child.data().unwrap().loading);
    assert_eq!(engine.last_handle().unwrap().active_observers(), 0);
    assert_eq!(binding.state(), LifecycleState::Unmounted);

    binding.mount().unwrap();
    assert_eq!(engine.handle_count(), 1);
    assert_eq!(engine.last_handle().unwrap().active_observers(), 1);
}

#[test]
fn test_query_snapshot_scenario() {
    let (engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );
    binding.render().unwrap();
    binding.mount().unwrap();
    let handle = engine.last_handle().unwrap();

    handle.set_current(QueryResult::loading().with_data(props(json!({"partial": true}))));
    let child = binding.render().unwrap();
    let data = child.data().unwrap();
    assert!(data.loading);
    assert_eq!(data.fields, props(json!({"partial": true})));

    handle.push_data(json!({"x": 1})).unwrap();
    let child = binding.render().unwrap();
    let data = child.data().unwrap();
    assert!(!data.loading);
    assert_eq!(data.field("x"), Some(&json!(1)));
    assert!(data.error().is_none());

    handle.push_error(QueryError::graphql("failed")).unwrap();
    let child = binding.render().unwrap();
    let data = child.data().unwrap();
    assert_eq!(data.field("x"), Some(&json!(1)));
    assert_eq!(data.error(), Some(&QueryError::graphql("failed")));

    // While reloading, previous data stays visible under new partial data.
    handle.set_current(QueryResult::loading().with_data(props(json!({"y": 2}))));
    let child = binding.render().unwrap();
    assert_eq!(child.data().unwrap().fields, props(json!({"x": 1, "y": 2})));
}

#[test]
fn test_unread_error_warns_once_and_read_error_does_not() {
    let (engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );
    binding.mount().unwrap();
    engine
        .last_handle()
        .unwrap()
        .push_error(QueryError::graphql("nope"))
        .unwrap();

    let later = Instant::now() + Duration::from_secs(1);

    let read = binding.render().unwrap();
    assert!(read.data().unwrap().error().is_some());
    assert_eq!(binding.pending_warnings(), 0);
    assert_eq!(binding.process_timers_at(later), 0);
    assert_eq!(binding.time_until_next_warning(), None);

    let _unread = binding.render().unwrap();
    assert_eq!(binding.pending_warnings(), 1);
    let due = binding.time_until_next_warning().unwrap();
    assert!(due <= Duration::from_millis(10));
    assert_eq!(binding.process_timers_at(later), 1);
    assert_eq!(binding.process_timers_at(later), 0);
}

#[test]
fn test_unmount_drops_pending_warnings() {
    let (engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );
    binding.mount().unwrap();
    engine
        .last_handle()
        .unwrap()
        .push_error(QueryError::graphql("nope"))
        .unwrap();
    let _unread = binding.render().unwrap();

    binding.unmount();
    assert_eq!(binding.pending_warnings(), 0);
    assert_eq!(binding.time_until_next_warning(), None);
    assert_eq!(binding.process_timers_at(Instant::now() + Duration::from_secs(1)), 0);
}

#[test]
fn test_props_update_resubscribes_attach_before_detach() {
    let (engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );
    binding.mount().unwrap();
    let handle = engine.last_handle().unwrap();
    handle.push_data(json!({"user": {"name": "Ada"}})).unwrap();

    binding.update_props(props(json!({"id": 2}))).unwrap();

    let events = handle.events();
    let tail: Vec<_> = events.iter().skip_while(|e| **e != HandleEvent::Subscribed(0)).collect();
    assert!(matches!(tail[1], HandleEvent::OptionsSet(_)));
    assert_eq!(tail[2], &HandleEvent::Subscribed(1));
    assert_eq!(tail[3], &HandleEvent::Restored);
    assert_eq!(tail[4], &HandleEvent::Unsubscribed(0));

    assert_eq!(handle.active_observers(), 1);
    assert_eq!(handle.variables().get("id"), Some(&json!(2)));
    assert!(handle.last_result().is_some());
    assert_eq!(engine.handle_count(), 1);
}

#[test]
fn test_failed_option_update_is_swallowed() {
    let (engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );
    binding.mount().unwrap();
    let handle = engine.last_handle().unwrap();
    handle.fail_next_set_options(QueryError::network("offline"));

    assert!(binding.update_props(props(json!({"id": 2}))).is_ok());
    assert_eq!(binding.state(), LifecycleState::Subscribed);
}

#[test]
fn test_update_without_option_path_still_resubscribes() {
    let engine = MockEngine::without_set_options();
    let provider = QueryProvider::new(Arc::new(engine.clone()));
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );
    binding.mount().unwrap();

    binding.update_props(props(json!({"id": 2}))).unwrap();
    let handle = engine.last_handle().unwrap();
    assert_eq!(handle.active_observers(), 1);
    assert!(!handle.events().iter().any(|e| matches!(e, HandleEvent::OptionsSet(_))));
}

#[test]
fn test_skip_then_unskip() {
    let (engine, provider) = setup();
    let config = BindingConfig::new::<Profile>(profile_query())
        .skip(|props| props.get("id").is_none());
    let mut binding = provider.bind(config, props(json!({"title": "t"})), Context::new());

    let child = binding.render().unwrap();
    assert!(child.result.is_none());
    assert_eq!(child.props, props(json!({"title": "t"})));
    binding.mount().unwrap();
    assert_eq!(binding.state(), LifecycleState::Idle);
    assert_eq!(engine.handle_count(), 0);

    binding.update_props(props(json!({"id": 9}))).unwrap();
    assert_eq!(binding.state(), LifecycleState::Subscribed);
    let handle = engine.last_handle().unwrap();
    assert_eq!(handle.active_observers(), 1);

    binding.update_props(props(json!({}))).unwrap();
    assert_eq!(binding.state(), LifecycleState::Idle);
    assert_eq!(handle.active_observers(), 0);
    assert!(binding.handle().is_some());

    binding.update_props(props(json!({"id": 9}))).unwrap();
    assert_eq!(binding.state(), LifecycleState::Subscribed);
    assert_eq!(engine.handle_count(), 1);
}

#[tokio::test]
async fn test_refetch_before_mount_settles_after_mount() {
    let (engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );

    let child = binding.render().unwrap();
    let refetch = child.data().unwrap().controls().unwrap().refetch(None);
    let handle = engine.last_handle().unwrap();
    assert!(handle.refetch_calls().is_empty());

    binding.mount().unwrap();
    assert_eq!(handle.refetch_calls(), vec![None]);
    assert!(refetch.await.is_ok());

    // Once subscribed, refetch goes straight to the handle.
    let child = binding.render().unwrap();
    child.data().unwrap().controls().unwrap().refetch(None).await.unwrap();
    assert_eq!(handle.refetch_calls().len(), 2);
}

#[tokio::test]
async fn test_refetch_rejected_when_never_mounted() {
    let (_engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );

    let child = binding.render().unwrap();
    let refetch = child.data().unwrap().controls().unwrap().refetch(None);
    drop(binding);
    assert_eq!(refetch.await, Err(QueryError::Cancelled));
}

#[tokio::test]
async fn test_refetch_on_early_snapshot_after_mount() {
    let (engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );

    let early = binding.render().unwrap();
    binding.mount().unwrap();
    let handle = engine.last_handle().unwrap();
    assert!(handle.refetch_calls().is_empty());

    let refetch = early.data().unwrap().controls().unwrap().refetch(None);
    assert_eq!(handle.refetch_calls(), vec![None]);
    let settled = tokio::time::timeout(Duration::from_millis(200), refetch).await;
    assert!(matches!(settled, Ok(Ok(_))));
}

#[tokio::test]
async fn test_refetch_on_early_snapshot_parks_while_skipped() {
    let (engine, provider) = setup();
    let config = BindingConfig::new::<Profile>(profile_query())
        .skip(|props| props.get("id").is_none());
    let mut binding = provider.bind(config, props(json!({"id": 1})), Context::new());

    let early = binding.render().unwrap();
    binding.mount().unwrap();
    let handle = engine.last_handle().unwrap();

    binding.update_props(props(json!({}))).unwrap();
    let refetch = early.data().unwrap().controls().unwrap().refetch(None);
    assert!(handle.refetch_calls().is_empty());

    binding.update_props(props(json!({"id": 1}))).unwrap();
    assert_eq!(handle.refetch_calls(), vec![None]);
    assert!(refetch.await.is_ok());
}

#[test]
fn test_push_requests_render_only_while_mounted() {
    let (engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );
    let renders = Arc::new(AtomicUsize::new(0));
    let r = renders.clone();
    binding.render_requested().connect(move |_| {
        r.fetch_add(1, Ordering::SeqCst);
    });

    binding.mount().unwrap();
    let handle = engine.last_handle().unwrap();
    handle.push_data(json!({"user": null})).unwrap();
    handle.push_error(QueryError::graphql("bad")).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 2);

    binding.unmount();
    handle.push_data(json!({"user": null})).unwrap();
    assert_eq!(renders.load(Ordering::SeqCst), 2);
}

#[test]
fn test_unexpected_push_error_is_raised() {
    let (engine, provider) = setup();
    let mut binding = provider.bind(
        BindingConfig::new::<Profile>(profile_query()),
        props(json!({"id": 1})),
        Context::new(),
    );
    binding.mount().unwrap();

    let err = engine
        .last_handle()
        .unwrap()
        .push_error(QueryError::network("socket closed"))
        .unwrap_err();
    assert!(matches!(err, BindingError::UnhandledQuery { .. }));
    assert!(err.to_string().starts_with("Unhandled (in GraphQL(Profile))"));
}

#[test]
fn test_subscription_snapshot_follows_pushes() {
    let (engine, provider) = setup();
    let config = BindingConfig::new::<Feed>(
        Operation::subscription("subscription OnPost($room: String) { post { body } }")
            .variable("room"),
    )
    .name("feed");
    let mut binding = provider.bind(config, props(json!({"room": "lobby"})), Context::new());

    binding.mount().unwrap();
    let child = binding.render().unwrap();
    assert_eq!(child.result.as_ref().unwrap().name, "feed");
    let data = child.data().unwrap();
    assert!(data.loading);
    assert_eq!(data.variables, Some(props(json!({"room": "lobby"}))));

    engine
        .last_handle()
        .unwrap()
        .push_data(json!({"post": {"body": "hello"}}))
        .unwrap();
    let child = binding.render().unwrap();
    let data = child.data().unwrap();
    assert!(!data.loading);
    assert_eq!(data.field("post"), Some(&json!({"body": "hello"})));
}

#[tokio::test]
async fn test_mutation_binding() {
    let (engine, provider) = setup();
    let op = Operation::mutation("mutation Save($id: ID!, $name: String) { save }")
        .named("Save")
        .required_variable("id")
        .variable("name");
    let config = BindingConfig::new::<SaveButton>(op)
        .options_value(QueryOptions::new().fetch_policy(FetchPolicy::NoCache));
    let mut binding = provider.bind(config, props(json!({"id": "u1"})), Context::new());

    let child = binding.render().unwrap();
    binding.mount().unwrap();
    assert_eq!(binding.state(), LifecycleState::Idle);
    assert_eq!(engine.handle_count(), 0);
    assert_eq!(child.result.as_ref().unwrap().name, "mutate");

    let updated = Arc::new(AtomicUsize::new(0));
    let u = updated.clone();
    let call = MutationCall {
        options: QueryOptions::new().variable("name", "Ada"),
        update: Some(Arc::new(move |_| {
            u.fetch_add(1, Ordering::SeqCst);
        })),
    };
    child.mutator().unwrap().mutate(call).unwrap().await.unwrap();

    let sent = engine.mutations();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].options.variables, Some(props(json!({"name": "Ada"}))));
    assert_eq!(sent[0].options.fetch_policy, Some(FetchPolicy::NoCache));
    assert_eq!(updated.load(Ordering::SeqCst), 1);
    assert_eq!(engine.handle_count(), 0);
}

#[test]
fn test_mutation_missing_variable() {
    let (engine, provider) = setup();
    let op = Operation::mutation("mutation Save($id: ID!) { save }")
        .named("Save")
        .required_variable("id");
    let mut binding = provider.bind(BindingConfig::new::<SaveButton>(op), Props::new(), Context::new());

    let child = binding.render().unwrap();
    let Err(err) = child.mutator().unwrap().mutate(MutationCall::default()) else {
        panic!("mutation without its required variable was sent");
    };
    assert_eq!(err.missing_variable_name(), Some("id"));
    assert!(engine.mutations().is_empty());
}
