use firestore_watch::errors::FirestoreError;
use firestore_watch::timestamp_utils::to_timestamp;
use firestore_watch::*;
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::FutureExt;
use futures::StreamExt;
use gcloud_sdk::google::firestore::v1::*;
use gcloud_sdk::tonic;
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio::time::{sleep, Duration};

pub const TEST_DATABASE_PATH: &str = "projects/test-project/databases/(default)";
pub const TEST_DOCUMENTS_PATH: &str = "projects/test-project/databases/(default)/documents";

#[allow(dead_code)]
pub fn setup() {
    // Logging with debug enabled
    let filter = tracing_subscriber::EnvFilter::builder()
        .parse("info,firestore_watch=debug")
        .unwrap();

    let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

/// What a single opened listen stream does.
#[allow(dead_code)]
pub enum ScriptedSession {
    /// The stream can't be opened.
    Fail(FirestoreError),
    /// Responds with the events and closes the stream.
    Close(Vec<Result<ListenResponse, FirestoreError>>),
    /// Responds with the events and stays open.
    Hang(Vec<Result<ListenResponse, FirestoreError>>),
}

#[derive(Default)]
struct ScriptedListenState {
    sessions: VecDeque<ScriptedSession>,
    requests: Vec<ListenRequest>,
}

/// An in-memory listen transport replaying scripted sessions, one per opened stream.
/// Once the script is exhausted every new stream stays open without events.
#[derive(Clone, Default)]
pub struct ScriptedListenTransport {
    state: Arc<Mutex<ScriptedListenState>>,
}

#[allow(dead_code)]
impl ScriptedListenTransport {
    pub fn new(sessions: Vec<ScriptedSession>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ScriptedListenState {
                sessions: sessions.into(),
                requests: Vec::new(),
            })),
        }
    }

    /// Initial requests of every opened stream.
    pub fn requests(&self) -> Vec<ListenRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().requests.len()
    }
}

#[async_trait]
impl FirestoreListenSupport for ScriptedListenTransport {
    fn database_path(&self) -> &str {
        TEST_DATABASE_PATH
    }

    async fn listen_stream(
        &self,
        mut requests: BoxStream<'static, ListenRequest>,
    ) -> FirestoreResult<BoxStream<'static, FirestoreResult<ListenResponse>>> {
        let initial_request = requests
            .next()
            .await
            .expect("initial listen request must be sent");

        let session = {
            let mut state = self.state.lock().unwrap();
            state.requests.push(initial_request);
            state.sessions.pop_front()
        };

        match session {
            Some(ScriptedSession::Fail(err)) => Err(err),
            Some(ScriptedSession::Close(events)) => Ok(futures::stream::iter(events).boxed()),
            Some(ScriptedSession::Hang(events)) => Ok(futures::stream::iter(events)
                .chain(futures::stream::pending())
                .boxed()),
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}

#[allow(dead_code)]
pub fn doc_path(id: &str) -> String {
    format!("{TEST_DOCUMENTS_PATH}/cities/{id}")
}

#[allow(dead_code)]
pub fn target_change(
    change_type: target_change::TargetChangeType,
    resume_token: &[u8],
    read_secs: Option<i64>,
) -> Result<ListenResponse, FirestoreError> {
    Ok(ListenResponse {
        response_type: Some(listen_response::ResponseType::TargetChange(TargetChange {
            target_change_type: change_type as i32,
            target_ids: vec![],
            cause: None,
            resume_token: resume_token.to_vec(),
            read_time: read_secs.map(|secs| gcloud_sdk::prost_types::Timestamp {
                seconds: secs,
                nanos: 0,
            }),
        })),
    })
}

#[allow(dead_code)]
pub fn added() -> Result<ListenResponse, FirestoreError> {
    target_change(target_change::TargetChangeType::Add, &[], None)
}

#[allow(dead_code)]
pub fn current(resume_token: &[u8]) -> Result<ListenResponse, FirestoreError> {
    target_change(target_change::TargetChangeType::Current, resume_token, None)
}

#[allow(dead_code)]
pub fn checkpoint(resume_token: &[u8], read_secs: i64) -> Result<ListenResponse, FirestoreError> {
    target_change(
        target_change::TargetChangeType::NoChange,
        resume_token,
        Some(read_secs),
    )
}

#[allow(dead_code)]
pub fn reset() -> Result<ListenResponse, FirestoreError> {
    target_change(target_change::TargetChangeType::Reset, &[], None)
}

#[allow(dead_code)]
pub fn removed_target(code: tonic::Code) -> Result<ListenResponse, FirestoreError> {
    Ok(ListenResponse {
        response_type: Some(listen_response::ResponseType::TargetChange(TargetChange {
            target_change_type: target_change::TargetChangeType::Remove as i32,
            target_ids: vec![0x42],
            cause: Some(gcloud_sdk::google::rpc::Status {
                code: code as i32,
                message: "target removed".to_string(),
                details: vec![],
            }),
            resume_token: vec![],
            read_time: None,
        })),
    })
}

#[allow(dead_code)]
pub fn document(id: &str, update_secs: i64, population: i64) -> Document {
    let population: FirestoreValue = population.into();
    let name: FirestoreValue = id.into();
    Document {
        name: doc_path(id),
        fields: HashMap::from([
            ("population".to_string(), population.value),
            ("name".to_string(), name.value),
        ]),
        create_time: Some(to_timestamp(
            chrono::DateTime::from_timestamp(1, 0).unwrap(),
        )),
        update_time: Some(to_timestamp(
            chrono::DateTime::from_timestamp(update_secs, 0).unwrap(),
        )),
    }
}

#[allow(dead_code)]
pub fn document_changed(
    id: &str,
    update_secs: i64,
    population: i64,
) -> Result<ListenResponse, FirestoreError> {
    Ok(ListenResponse {
        response_type: Some(listen_response::ResponseType::DocumentChange(DocumentChange {
            document: Some(document(id, update_secs, population)),
            target_ids: vec![0x42],
            removed_target_ids: vec![],
        })),
    })
}

#[allow(dead_code)]
pub fn document_left_target(id: &str, update_secs: i64) -> Result<ListenResponse, FirestoreError> {
    Ok(ListenResponse {
        response_type: Some(listen_response::ResponseType::DocumentChange(DocumentChange {
            document: Some(document(id, update_secs, 0)),
            target_ids: vec![],
            removed_target_ids: vec![0x42],
        })),
    })
}

#[allow(dead_code)]
pub fn document_deleted(id: &str) -> Result<ListenResponse, FirestoreError> {
    Ok(ListenResponse {
        response_type: Some(listen_response::ResponseType::DocumentDelete(DocumentDelete {
            document: doc_path(id),
            removed_target_ids: vec![0x42],
            read_time: None,
        })),
    })
}

#[allow(dead_code)]
pub fn existence_filter(count: i32) -> Result<ListenResponse, FirestoreError> {
    Ok(ListenResponse {
        response_type: Some(listen_response::ResponseType::Filter(ExistenceFilter {
            target_id: 0x42,
            count,
            ..Default::default()
        })),
    })
}

#[allow(dead_code)]
pub fn status_error(code: tonic::Code) -> FirestoreError {
    tonic::Status::new(code, "scripted failure").into()
}

#[allow(dead_code)]
pub fn cities_by_population() -> FirestoreListenerTargetType {
    FirestoreListenerTargetType::Query(
        FirestoreListenQuery::new(TEST_DOCUMENTS_PATH.to_string(), "cities".to_string())
            .with_order_by(vec![(
                "population",
                FirestoreQueryDirection::Ascending,
            )
                .into()]),
    )
}

#[allow(dead_code)]
pub fn resume_token_of(request: &ListenRequest) -> Option<Vec<u8>> {
    match request.target_change {
        Some(listen_request::TargetChange::AddTarget(ref target)) => match target.resume_type {
            Some(target::ResumeType::ResumeToken(ref token)) => Some(token.clone()),
            _ => None,
        },
        _ => None,
    }
}

/// Ids of the documents in a snapshot, in snapshot order.
#[allow(dead_code)]
pub fn snapshot_ids(snapshot: &FirestoreQuerySnapshot) -> Vec<String> {
    snapshot
        .documents
        .iter()
        .map(|doc| doc.id().to_string())
        .collect()
}

#[allow(dead_code)]
pub fn eventually_async<'a, F, FN>(
    max_retries: usize,
    sleep_duration: std::time::Duration,
    f: FN,
) -> BoxFuture<'a, Result<bool, Box<dyn std::error::Error + Send + Sync>>>
where
    FN: Fn() -> F + Send + Sync + 'a,
    F: Future<Output = Result<bool, Box<dyn std::error::Error + Send + Sync>>> + Send + 'a,
{
    async move {
        let mut retries = 0;
        loop {
            if f().await? {
                return Ok(true);
            }
            retries += 1;
            if retries > max_retries {
                return Ok(false);
            }
            sleep(Duration::from(sleep_duration)).await;
        }
    }
    .boxed()
}
