//! End-to-end behavior of the client with a scripted transport.
//!
//! Every test runs against an in-memory store, a manual clock and a fake
//! transport that records what would have gone over the wire.

use async_trait::async_trait;
use chrono::Duration;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use wsync::cache::Params;
use wsync::client::{
  CallError, CallOptions, CallOutcome, ClientEvent, Source, TransferOutcome, Transport,
  TransportError,
};
use wsync::clock::ManualClock;
use wsync::connectivity::NetworkState;
use wsync::content::{Content, ContentFile};
use wsync::context::AppContext;
use wsync::db::Database;
use wsync::settings;
use wsync::sync::{Descriptor, DownloadRequest, OperationKind, SkipReason, UploadRequest};

const TOKEN: &str = "t0ken";
const SITE_URL: &str = "https://school.example.org";
const SITE_ID: &str = "main";

// =============================================================================
// Scripted transport
// =============================================================================

#[derive(Default)]
struct FakeTransport {
  /// Answers by `wsfunction`; unknown functions get an empty list
  responses: Mutex<HashMap<String, Value>>,
  posts: Mutex<Vec<Params>>,
  uploads: Mutex<Vec<(String, String, String)>>,
  downloads: Mutex<Vec<String>>,
  failing: AtomicBool,
}

impl FakeTransport {
  fn respond(&self, function: &str, value: Value) {
    self
      .responses
      .lock()
      .unwrap()
      .insert(function.to_string(), value);
  }

  fn fail(&self, failing: bool) {
    self.failing.store(failing, Ordering::SeqCst);
  }

  fn posts(&self) -> Vec<Params> {
    self.posts.lock().unwrap().clone()
  }

  fn check(&self) -> Result<(), TransportError> {
    if self.failing.load(Ordering::SeqCst) {
      Err(TransportError::Network("connection reset".to_string()))
    } else {
      Ok(())
    }
  }
}

#[async_trait]
impl Transport for FakeTransport {
  async fn post_form(&self, _url: &str, form: &Params) -> Result<Value, TransportError> {
    // Give other tasks a turn, as a real request would.
    tokio::task::yield_now().await;
    self.check()?;
    self.posts.lock().unwrap().push(form.clone());

    let function = form.get("wsfunction").cloned().unwrap_or_default();
    Ok(
      self
        .responses
        .lock()
        .unwrap()
        .get(&function)
        .cloned()
        .unwrap_or_else(|| json!([])),
    )
  }

  async fn upload(
    &self,
    url: &str,
    request: &UploadRequest,
    token: &str,
  ) -> Result<(), TransportError> {
    self.check()?;
    self.uploads.lock().unwrap().push((
      url.to_string(),
      request.file_name.clone(),
      token.to_string(),
    ));
    Ok(())
  }

  async fn download(&self, url: &str, destination: &Path) -> Result<u64, TransportError> {
    self.check()?;
    self.downloads.lock().unwrap().push(url.to_string());

    if let Some(parent) = destination.parent() {
      std::fs::create_dir_all(parent)?;
    }
    let body = b"%PDF-1.4";
    std::fs::write(destination, body)?;
    Ok(body.len() as u64)
  }
}

// =============================================================================
// Harness
// =============================================================================

struct Harness {
  context: AppContext,
  transport: Arc<FakeTransport>,
  clock: ManualClock,
  events: mpsc::UnboundedReceiver<ClientEvent>,
}

impl Harness {
  fn new(ttl_secs: u64) -> Self {
    let transport = Arc::new(FakeTransport::default());
    let clock = ManualClock::default();
    let (tx, events) = mpsc::unbounded_channel();

    let context = AppContext::builder(Arc::new(Database::open_in_memory().unwrap()))
      .transport(transport.clone())
      .clock(Arc::new(clock.clone()))
      .network(Arc::new(NetworkState::new(true)))
      .events(tx)
      .build()
      .unwrap();

    let s = &context.settings;
    s.set(settings::CURRENT_TOKEN, TOKEN).unwrap();
    s.set(settings::CURRENT_SITE_URL, SITE_URL).unwrap();
    s.set(settings::CURRENT_SITE_ID, SITE_ID).unwrap();
    s.set(settings::CACHE_TTL_SECS, ttl_secs).unwrap();

    Self {
      context,
      transport,
      clock,
      events,
    }
  }

  async fn go_offline(&self) {
    assert!(self.context.on_network_change(false).await.is_none());
  }

  fn drain_events(&mut self) -> Vec<ClientEvent> {
    let mut events = Vec::new();
    while let Ok(event) = self.events.try_recv() {
      events.push(event);
    }
    events
  }
}

fn completion(cmid: &str) -> Value {
  json!({ "cmid": cmid, "completed": true })
}

fn syncable() -> CallOptions {
  CallOptions::default()
    .no_cache()
    .syncable(Descriptor::new("Mark complete", ""))
}

const COMPLETION_FN: &str = "core_completion_update_activity_completion_status_manually";
const COURSES_FN: &str = "core_enrol_get_users_courses";

// =============================================================================
// Queueing and replay
// =============================================================================

#[tokio::test]
async fn test_offline_call_is_queued_once_and_replayed() {
  let mut h = Harness::new(300);
  h.go_offline().await;

  let first = h
    .context
    .client
    .call(COMPLETION_FN, &completion("7"), syncable())
    .await
    .unwrap();
  let second = h
    .context
    .client
    .call(COMPLETION_FN, &completion("7"), syncable())
    .await
    .unwrap();

  assert!(first.is_queued());
  assert_eq!(first, second);
  assert_eq!(h.context.queue().len().unwrap(), 1);
  assert!(h.transport.posts().is_empty());

  let queued: Vec<_> = h
    .drain_events()
    .into_iter()
    .filter(|e| matches!(e, ClientEvent::Queued { .. }))
    .collect();
  assert_eq!(queued.len(), 2);

  let report = h.context.on_network_change(true).await.unwrap();
  assert_eq!(report.completed, 1);
  assert_eq!(report.failed, 0);
  assert!(h.context.queue().is_empty().unwrap());

  let posts = h.transport.posts();
  assert_eq!(posts.len(), 1);
  assert_eq!(posts[0].get("wsfunction").map(String::as_str), Some(COMPLETION_FN));
  assert_eq!(posts[0].get("cmid").map(String::as_str), Some("7"));
  assert_eq!(posts[0].get("completed").map(String::as_str), Some("true"));
}

#[tokio::test]
async fn test_replay_follows_insertion_order() {
  let h = Harness::new(300);
  h.go_offline().await;

  for cmid in ["1", "2", "3"] {
    h.context
      .client
      .call(COMPLETION_FN, &completion(cmid), syncable())
      .await
      .unwrap();
  }

  h.context.on_network_change(true).await.unwrap();

  let order: Vec<String> = h
    .transport
    .posts()
    .iter()
    .filter_map(|p| p.get("cmid").cloned())
    .collect();
  assert_eq!(order, vec!["1", "2", "3"]);
}

#[tokio::test]
async fn test_failed_replay_keeps_operation_unchanged() {
  let h = Harness::new(300);
  h.go_offline().await;

  let id = match h
    .context
    .client
    .call(COMPLETION_FN, &completion("7"), syncable())
    .await
    .unwrap()
  {
    CallOutcome::Queued(id) => id,
    other => panic!("expected queued call, got {:?}", other),
  };
  let before = h.context.queue().get(&id).unwrap().unwrap();

  h.transport.fail(true);
  h.clock.advance(Duration::minutes(10));
  let report = h.context.on_network_change(true).await.unwrap();

  assert_eq!(report.completed, 0);
  assert_eq!(report.failed, 1);
  assert_eq!(h.context.queue().get(&id).unwrap(), Some(before));

  // A later pass succeeds once the site answers again.
  h.transport.fail(false);
  let report = h.context.sync_now().await;
  assert_eq!(report.completed, 1);
  assert!(h.context.queue().is_empty().unwrap());
}

#[tokio::test]
async fn test_operations_of_other_sites_are_left_alone() {
  let h = Harness::new(300);
  h.go_offline().await;

  h.context
    .client
    .call(COMPLETION_FN, &completion("7"), syncable())
    .await
    .unwrap();

  h.context
    .settings
    .set(settings::CURRENT_SITE_ID, "other")
    .unwrap();
  let report = h.context.on_network_change(true).await.unwrap();

  assert_eq!(report.skipped_other_site, 1);
  assert_eq!(report.completed, 0);
  assert_eq!(h.context.queue().len().unwrap(), 1);
  assert!(h.transport.posts().is_empty());
}

#[tokio::test]
async fn test_replay_respects_sync_switch_and_connectivity() {
  let h = Harness::new(300);
  h.go_offline().await;
  h.context
    .client
    .call(COMPLETION_FN, &completion("7"), syncable())
    .await
    .unwrap();

  assert_eq!(h.context.sync_now().await.skipped, Some(SkipReason::Offline));

  h.context
    .settings
    .set(settings::SYNC_WS_ON, false)
    .unwrap();
  let report = h.context.on_network_change(true).await.unwrap();
  assert_eq!(report.skipped, Some(SkipReason::Disabled));
  assert_eq!(h.context.queue().len().unwrap(), 1);

  h.context.settings.set(settings::SYNC_WS_ON, true).unwrap();
  assert_eq!(h.context.sync_now().await.completed, 1);
}

#[tokio::test]
async fn test_only_one_replay_pass_at_a_time() {
  let h = Harness::new(300);
  h.go_offline().await;
  h.context
    .client
    .call(COMPLETION_FN, &completion("7"), syncable())
    .await
    .unwrap();
  h.context.oracle().set_network_state(true);

  let (first, second) = tokio::join!(h.context.sync_now(), h.context.sync_now());

  assert_eq!(first.completed, 1);
  assert_eq!(second.skipped, Some(SkipReason::AlreadyRunning));
  assert_eq!(h.transport.posts().len(), 1);
}

#[tokio::test]
async fn test_developer_offline_switch_queues_calls() {
  let h = Harness::new(300);
  h.context
    .settings
    .set(settings::DEV_OFFLINE, true)
    .unwrap();

  let outcome = h
    .context
    .client
    .call(COMPLETION_FN, &completion("7"), syncable())
    .await
    .unwrap();
  assert!(outcome.is_queued());
  assert!(h.transport.posts().is_empty());
}

// =============================================================================
// Caching
// =============================================================================

#[tokio::test]
async fn test_cached_result_expires_after_ttl() {
  let h = Harness::new(60);
  h.transport.respond(COURSES_FN, json!([{ "id": 2, "shortname": "BIO101" }]));
  let args = json!({ "userid": 5 });

  let first = h
    .context
    .client
    .call(COURSES_FN, &args, CallOptions::default())
    .await
    .unwrap();
  match first {
    CallOutcome::Completed(ref result) => assert_eq!(result.source, Source::Network),
    ref other => panic!("expected completed call, got {:?}", other),
  }

  h.clock.advance(Duration::seconds(30));
  let second = h
    .context
    .client
    .call(COURSES_FN, &args, CallOptions::default())
    .await
    .unwrap();
  match &second {
    CallOutcome::Completed(result) => {
      assert_eq!(result.source, Source::Cache);
      assert!(result.stored_at.is_some());
    }
    other => panic!("expected completed call, got {:?}", other),
  }
  assert_eq!(first.data(), second.data());
  assert_eq!(h.transport.posts().len(), 1);

  h.clock.advance(Duration::seconds(31));
  h.context
    .client
    .call(COURSES_FN, &args, CallOptions::default())
    .await
    .unwrap();
  assert_eq!(h.transport.posts().len(), 2);
}

#[tokio::test]
async fn test_offline_serves_expired_cache() {
  let h = Harness::new(60);
  h.transport.respond(COURSES_FN, json!([{ "id": 2 }]));
  let args = json!({ "userid": 5 });

  h.context
    .client
    .call(COURSES_FN, &args, CallOptions::default())
    .await
    .unwrap();

  h.clock.advance(Duration::seconds(600));
  h.go_offline().await;

  let outcome = h
    .context
    .client
    .call(COURSES_FN, &args, CallOptions::default())
    .await
    .unwrap();
  match outcome {
    CallOutcome::Completed(result) => {
      assert_eq!(result.source, Source::StaleCache);
      assert_eq!(result.data, json!([{ "id": 2 }]));
    }
    other => panic!("expected completed call, got {:?}", other),
  }
  assert_eq!(h.transport.posts().len(), 1);
}

#[tokio::test]
async fn test_offline_without_cache_fails() {
  let mut h = Harness::new(60);
  h.go_offline().await;

  let err = h
    .context
    .client
    .call(COURSES_FN, &json!({ "userid": 5 }), CallOptions::default())
    .await
    .unwrap_err();
  assert!(matches!(err, CallError::Connectivity));
  assert!(matches!(
    h.drain_events().as_slice(),
    [ClientEvent::Error { .. }]
  ));
}

#[tokio::test]
async fn test_no_cache_call_always_hits_network() {
  let h = Harness::new(300);
  let args = json!({ "userid": 5 });

  for _ in 0..2 {
    h.context
      .client
      .call(COURSES_FN, &args, CallOptions::default().no_cache())
      .await
      .unwrap();
  }
  assert_eq!(h.transport.posts().len(), 2);
  assert!(h.context.cache().is_empty().unwrap());
}

// =============================================================================
// Errors and events
// =============================================================================

#[tokio::test]
async fn test_invalid_token_invalidates_session() {
  let mut h = Harness::new(300);
  h.transport.respond(
    COURSES_FN,
    json!({
      "exception": "moodle_exception",
      "errorcode": "invalidtoken",
      "message": "Invalid token - token not found"
    }),
  );

  let err = h
    .context
    .client
    .call(COURSES_FN, &json!({}), CallOptions::default().silent())
    .await
    .unwrap_err();
  assert!(matches!(err, CallError::SessionInvalidated { .. }));

  match h.drain_events().as_slice() {
    [ClientEvent::SessionInvalidated { site_id, .. }] => {
      assert_eq!(site_id.as_deref(), Some(SITE_ID))
    }
    other => panic!("expected session event, got {:?}", other),
  }
  assert!(h.context.cache().is_empty().unwrap());
}

#[tokio::test]
async fn test_application_error_is_not_cached() {
  let h = Harness::new(300);
  h.transport.respond(
    COURSES_FN,
    json!({ "exception": "invalid_parameter_exception", "message": "Invalid parameter value detected" }),
  );

  let err = h
    .context
    .client
    .call(COURSES_FN, &json!({}), CallOptions::default())
    .await
    .unwrap_err();
  match err {
    CallError::Application { message, .. } => {
      assert_eq!(message, "Error. Invalid parameter value detected")
    }
    other => panic!("expected application error, got {:?}", other),
  }
  assert!(h.context.cache().is_empty().unwrap());
}

#[tokio::test]
async fn test_transport_failure_reported_unless_silent() {
  let mut h = Harness::new(300);
  h.transport.fail(true);

  let loud = h
    .context
    .client
    .call(COURSES_FN, &json!({}), CallOptions::default())
    .await;
  assert!(matches!(loud, Err(CallError::Transport(_))));
  assert_eq!(h.drain_events().len(), 1);

  let quiet = h
    .context
    .client
    .call(COURSES_FN, &json!({}), CallOptions::default().silent())
    .await;
  assert!(matches!(quiet, Err(CallError::Transport(_))));
  assert!(h.drain_events().is_empty());
}

// =============================================================================
// File transfers
// =============================================================================

#[tokio::test]
async fn test_queued_download_patches_content() {
  let dir = tempfile::tempdir().unwrap();
  let h = Harness::new(300);
  h.context
    .contents
    .put(&Content {
      id: "page-12".to_string(),
      files: vec![ContentFile {
        url: format!("{}/webservice/pluginfile.php/12/notes.pdf", SITE_URL),
        local_path: None,
      }],
    })
    .unwrap();

  let destination = dir.path().join("site/page-12/notes.pdf");
  let request = DownloadRequest {
    url: format!("{}/webservice/pluginfile.php/12/notes.pdf", SITE_URL),
    destination: destination.clone(),
    content_id: "page-12".to_string(),
    file_index: 0,
  };

  h.go_offline().await;
  let outcome = h
    .context
    .client
    .download_content(request, None)
    .await
    .unwrap();
  assert!(matches!(outcome, TransferOutcome::Queued(_)));
  assert_eq!(
    h.context
      .queue()
      .list_kind(OperationKind::FileDownload)
      .unwrap()
      .len(),
    1
  );

  let report = h.context.on_network_change(true).await.unwrap();
  assert_eq!(report.completed, 1);

  let downloads = h.transport.downloads.lock().unwrap().clone();
  assert_eq!(downloads.len(), 1);
  assert!(downloads[0].contains("token=t0ken"));

  let content = h.context.contents.get("page-12").unwrap().unwrap();
  assert_eq!(content.files[0].local_path.as_deref(), Some(destination.as_path()));
  assert!(destination.exists());
}

#[tokio::test]
async fn test_download_for_missing_content_stays_queued() {
  let dir = tempfile::tempdir().unwrap();
  let h = Harness::new(300);
  h.go_offline().await;

  h.context
    .client
    .download_content(
      DownloadRequest {
        url: format!("{}/pluginfile.php/1/a.pdf", SITE_URL),
        destination: dir.path().join("a.pdf"),
        content_id: "gone".to_string(),
        file_index: 0,
      },
      None,
    )
    .await
    .unwrap();

  let report = h.context.on_network_change(true).await.unwrap();
  assert_eq!(report.failed, 1);
  assert_eq!(h.context.queue().len().unwrap(), 1);
}

#[tokio::test]
async fn test_upload_queued_offline_and_sent_with_token() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("essay.txt");
  std::fs::write(&file, "draft").unwrap();

  let h = Harness::new(300);
  h.go_offline().await;

  let outcome = h
    .context
    .client
    .upload_file(UploadRequest::new(&file, "text/plain"), None)
    .await
    .unwrap();
  assert!(matches!(outcome, TransferOutcome::Queued(_)));
  assert!(h.transport.uploads.lock().unwrap().is_empty());

  let report = h.context.on_network_change(true).await.unwrap();
  assert_eq!(report.completed, 1);

  let uploads = h.transport.uploads.lock().unwrap().clone();
  assert_eq!(
    uploads,
    vec![(
      format!("{}/webservice/upload.php", SITE_URL),
      "essay.txt".to_string(),
      TOKEN.to_string()
    )]
  );
}

#[tokio::test]
async fn test_each_kind_replays_independently() {
  let dir = tempfile::tempdir().unwrap();
  let file = dir.path().join("essay.txt");
  std::fs::write(&file, "draft").unwrap();

  let h = Harness::new(300);
  h.go_offline().await;

  h.context
    .client
    .call(COMPLETION_FN, &completion("7"), syncable())
    .await
    .unwrap();
  h.context
    .client
    .upload_file(UploadRequest::new(&file, "text/plain"), None)
    .await
    .unwrap();
  // Nothing to attach the download to, so it fails on replay.
  h.context
    .client
    .download_content(
      DownloadRequest {
        url: format!("{}/pluginfile.php/1/a.pdf", SITE_URL),
        destination: dir.path().join("a.pdf"),
        content_id: "gone".to_string(),
        file_index: 0,
      },
      None,
    )
    .await
    .unwrap();

  let report = h.context.on_network_change(true).await.unwrap();
  assert_eq!(report.completed, 2);
  assert_eq!(report.failed, 1);

  let left = h.context.queue().list().unwrap();
  assert_eq!(left.len(), 1);
  assert_eq!(left[0].kind(), OperationKind::FileDownload);
}
