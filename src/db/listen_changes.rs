use crate::{
    FirestoreDb, FirestoreDocumentListener, FirestoreListenQuery, FirestoreListener,
    FirestoreListenerParams, FirestoreListenerTargetType, FirestoreResult,
};
pub use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use futures::TryStreamExt;
use gcloud_sdk::google::firestore::v1::*;
use gcloud_sdk::tonic;

/// A transport able to open bidirectional `Listen` streams.
///
/// The returned stream ends when the server closes the call. Closing
/// `requests` half-closes the call from the client side.
#[async_trait]
pub trait FirestoreListenSupport {
    fn database_path(&self) -> &str;

    async fn listen_stream(
        &self,
        requests: BoxStream<'static, ListenRequest>,
    ) -> FirestoreResult<BoxStream<'static, FirestoreResult<ListenResponse>>>;
}

#[async_trait]
impl FirestoreListenSupport for FirestoreDb {
    fn database_path(&self) -> &str {
        self.get_database_path()
    }

    async fn listen_stream(
        &self,
        requests: BoxStream<'static, ListenRequest>,
    ) -> FirestoreResult<BoxStream<'static, FirestoreResult<ListenResponse>>> {
        let mut client = self.client().get();
        let response = client
            .listen(tonic::Request::new(ListenRequestStream(requests)))
            .await?;

        Ok(response.into_inner().map_err(|e| e.into()).boxed())
    }
}

impl FirestoreDb {
    /// A query over a top level collection of this database.
    pub fn listen_query<S>(&self, collection_id: S) -> FirestoreListenQuery
    where
        S: AsRef<str>,
    {
        FirestoreListenQuery::new(
            self.get_documents_path().clone(),
            collection_id.as_ref().to_string(),
        )
    }

    pub fn create_query_listener(
        &self,
        query: FirestoreListenQuery,
    ) -> FirestoreResult<FirestoreListener<FirestoreDb>> {
        self.create_query_listener_with_params(query, FirestoreListenerParams::new())
    }

    pub fn create_query_listener_with_params(
        &self,
        query: FirestoreListenQuery,
        params: FirestoreListenerParams,
    ) -> FirestoreResult<FirestoreListener<FirestoreDb>> {
        FirestoreListener::new(
            self.clone(),
            FirestoreListenerTargetType::Query(query),
            params,
        )
    }

    pub fn create_document_listener<S>(
        &self,
        collection_id: &str,
        document_id: S,
    ) -> FirestoreResult<FirestoreDocumentListener<FirestoreDb>>
    where
        S: AsRef<str>,
    {
        self.create_document_listener_with_params(
            collection_id,
            document_id,
            FirestoreListenerParams::new(),
        )
    }

    pub fn create_document_listener_with_params<S>(
        &self,
        collection_id: &str,
        document_id: S,
        params: FirestoreListenerParams,
    ) -> FirestoreResult<FirestoreDocumentListener<FirestoreDb>>
    where
        S: AsRef<str>,
    {
        FirestoreDocumentListener::new(
            self.clone(),
            self.document_path(collection_id, document_id)?,
            params,
        )
    }
}
/// Named wrapper around the request stream; lets the compiler prove the
/// `listen` future is `Send` (a bare `BoxStream` trips a higher-ranked
/// lifetime error).
struct ListenRequestStream(BoxStream<'static, ListenRequest>);

impl futures::Stream for ListenRequestStream {
    type Item = ListenRequest;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<ListenRequest>> {
        self.0.as_mut().poll_next(cx)
    }
}
