use crate::errors::*;
use crate::listener::order::{FirestoreQueryOrder, FirestoreQueryOrdering};
use crate::FirestoreResult;
use gcloud_sdk::google::firestore::v1::*;
use rsb_derive::*;
use rvstruct::ValueStruct;
use std::collections::HashMap;

/// Target id reused by every reconnect of the same logical watch.
pub const FIRESTORE_DEFAULT_LISTENER_TARGET_ID: u32 = 0x42;

#[derive(Clone, Debug, Eq, PartialEq, Hash, ValueStruct)]
pub struct FirestoreListenerTarget(u32);

impl Default for FirestoreListenerTarget {
    fn default() -> Self {
        FirestoreListenerTarget(FIRESTORE_DEFAULT_LISTENER_TARGET_ID)
    }
}

impl FirestoreListenerTarget {
    pub fn validate(&self) -> FirestoreResult<()> {
        if *self.value() == 0 {
            Err(FirestoreError::InvalidParametersError(
                FirestoreInvalidParametersError::new(FirestoreInvalidParametersPublicDetails::new(
                    "target_id".to_string(),
                    "Listener target ID cannot be zero".to_string(),
                )),
            ))
        } else if *self.value() > i32::MAX as u32 {
            Err(FirestoreError::InvalidParametersError(
                FirestoreInvalidParametersError::new(FirestoreInvalidParametersPublicDetails::new(
                    "target_id".to_string(),
                    format!(
                        "Listener target ID cannot be more than: {}. {} is specified",
                        i32::MAX,
                        self.value()
                    ),
                )),
            ))
        } else {
            Ok(())
        }
    }
}

impl TryFrom<&FirestoreListenerTarget> for i32 {
    type Error = FirestoreError;

    fn try_from(target: &FirestoreListenerTarget) -> FirestoreResult<i32> {
        target.validate()?;
        Ok(*target.value() as i32)
    }
}

/// Opaque resume position handed out by the server on checkpoints.
#[derive(Clone, Debug, Eq, PartialEq, ValueStruct)]
pub struct FirestoreListenerToken(Vec<u8>);

/// A structured query to watch.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct FirestoreListenQuery {
    /// Parent resource: the database documents path or a document path for sub-collections.
    pub parent: String,
    pub collection_id: String,
    pub all_descendants: Option<bool>,
    pub filter: Option<structured_query::Filter>,
    pub order_by: Option<Vec<FirestoreQueryOrder>>,
    pub limit: Option<u32>,
}

impl FirestoreListenQuery {
    pub fn ordering(&self) -> FirestoreQueryOrdering {
        FirestoreQueryOrdering::new(self.order_by.clone().unwrap_or_default())
    }
}

impl From<&FirestoreListenQuery> for StructuredQuery {
    fn from(query: &FirestoreListenQuery) -> Self {
        StructuredQuery {
            from: vec![structured_query::CollectionSelector {
                collection_id: query.collection_id.clone(),
                all_descendants: query.all_descendants.unwrap_or(false),
            }],
            r#where: query.filter.clone(),
            order_by: query
                .order_by
                .iter()
                .flatten()
                .cloned()
                .map(structured_query::Order::from)
                .collect(),
            limit: query.limit.map(|limit| limit as i32),
            ..Default::default()
        }
    }
}

impl TryFrom<(String, &StructuredQuery)> for FirestoreListenQuery {
    type Error = FirestoreError;

    fn try_from((parent, query): (String, &StructuredQuery)) -> FirestoreResult<Self> {
        let collection = query.from.first().ok_or_else(|| {
            FirestoreError::InvalidParametersError(FirestoreInvalidParametersError::new(
                FirestoreInvalidParametersPublicDetails::new(
                    "from".to_string(),
                    "Query must select a collection".to_string(),
                ),
            ))
        })?;

        let order_by = query
            .order_by
            .iter()
            .map(FirestoreQueryOrder::try_from)
            .collect::<FirestoreResult<Vec<_>>>()?;

        Ok(FirestoreListenQuery::new(parent, collection.collection_id.clone())
            .with_all_descendants(collection.all_descendants)
            .opt_filter(query.r#where.clone())
            .opt_order_by(if order_by.is_empty() {
                None
            } else {
                Some(order_by)
            })
            .opt_limit(query.limit.map(|limit| limit.max(0) as u32)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FirestoreListenerTargetType {
    Query(FirestoreListenQuery),
    /// A single document by its full resource name.
    Document(String),
}

impl FirestoreListenerTargetType {
    pub fn ordering(&self) -> FirestoreQueryOrdering {
        match self {
            FirestoreListenerTargetType::Query(query) => query.ordering(),
            FirestoreListenerTargetType::Document(_) => FirestoreQueryOrdering::by_path(),
        }
    }
}

#[derive(Debug, Clone, Builder)]
pub struct FirestoreListenerTargetParams {
    pub target_type: FirestoreListenerTargetType,
    #[default = "FirestoreListenerTarget::default()"]
    pub target: FirestoreListenerTarget,
    pub labels: Option<HashMap<String, String>>,
}

impl FirestoreListenerTargetParams {
    pub fn validate(&self) -> FirestoreResult<()> {
        self.target.validate()?;
        match self.target_type {
            FirestoreListenerTargetType::Document(ref path) if path.is_empty() => {
                Err(FirestoreError::InvalidParametersError(
                    FirestoreInvalidParametersError::new(
                        FirestoreInvalidParametersPublicDetails::new(
                            "document".to_string(),
                            "Document path cannot be empty".to_string(),
                        ),
                    ),
                ))
            }
            _ => Ok(()),
        }
    }

    /// The initial request of a listen stream, resuming from `resume_token` when present.
    pub fn to_listen_request(
        &self,
        database_path: &str,
        resume_token: Option<&FirestoreListenerToken>,
    ) -> FirestoreResult<ListenRequest> {
        Ok(ListenRequest {
            database: database_path.to_string(),
            labels: self.labels.clone().unwrap_or_default(),
            target_change: Some(listen_request::TargetChange::AddTarget(Target {
                target_id: (&self.target).try_into()?,
                target_type: Some(match self.target_type {
                    FirestoreListenerTargetType::Query(ref query) => {
                        target::TargetType::Query(target::QueryTarget {
                            parent: query.parent.clone(),
                            query_type: Some(target::query_target::QueryType::StructuredQuery(
                                query.into(),
                            )),
                        })
                    }
                    FirestoreListenerTargetType::Document(ref path) => {
                        target::TargetType::Documents(target::DocumentsTarget {
                            documents: vec![path.clone()],
                        })
                    }
                }),
                resume_type: resume_token
                    .map(|token| target::ResumeType::ResumeToken(token.value().clone())),
                ..Default::default()
            })),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::order::FirestoreQueryDirection;

    fn query_params() -> FirestoreListenerTargetParams {
        FirestoreListenerTargetParams::new(FirestoreListenerTargetType::Query(
            FirestoreListenQuery::new(
                "projects/p/databases/(default)/documents".to_string(),
                "cities".to_string(),
            )
            .with_order_by(vec![("population", FirestoreQueryDirection::Descending).into()]),
        ))
    }

    #[test]
    fn test_target_validation() {
        assert!(FirestoreListenerTarget::new(0).validate().is_err());
        assert!(FirestoreListenerTarget::new(i32::MAX as u32 + 1)
            .validate()
            .is_err());
        assert!(FirestoreListenerTarget::default().validate().is_ok());
        assert!(FirestoreListenerTargetParams::new(FirestoreListenerTargetType::Document(
            String::new()
        ))
        .validate()
        .is_err());
    }

    #[test]
    fn test_initial_request_without_token() {
        let request = query_params()
            .to_listen_request("projects/p/databases/(default)", None)
            .unwrap();

        assert_eq!(request.database, "projects/p/databases/(default)");
        match request.target_change {
            Some(listen_request::TargetChange::AddTarget(target)) => {
                assert_eq!(target.target_id, 0x42);
                assert!(target.resume_type.is_none());
                match target.target_type {
                    Some(target::TargetType::Query(query_target)) => {
                        assert_eq!(
                            query_target.parent,
                            "projects/p/databases/(default)/documents"
                        );
                        match query_target.query_type {
                            Some(target::query_target::QueryType::StructuredQuery(query)) => {
                                assert_eq!(query.from[0].collection_id, "cities");
                                assert_eq!(query.order_by.len(), 1);
                            }
                            other => panic!("Unexpected query type: {:?}", other),
                        }
                    }
                    other => panic!("Unexpected target type: {:?}", other),
                }
            }
            other => panic!("Unexpected target change: {:?}", other),
        }
    }

    #[test]
    fn test_initial_request_with_token() {
        let token = FirestoreListenerToken::new(vec![1, 2, 3]);
        let request = FirestoreListenerTargetParams::new(FirestoreListenerTargetType::Document(
            "projects/p/databases/(default)/documents/c/d".to_string(),
        ))
        .to_listen_request("projects/p/databases/(default)", Some(&token))
        .unwrap();

        match request.target_change {
            Some(listen_request::TargetChange::AddTarget(target)) => {
                assert_eq!(
                    target.resume_type,
                    Some(target::ResumeType::ResumeToken(vec![1, 2, 3]))
                );
                assert_eq!(
                    target.target_type,
                    Some(target::TargetType::Documents(target::DocumentsTarget {
                        documents: vec!["projects/p/databases/(default)/documents/c/d".to_string()]
                    }))
                );
            }
            other => panic!("Unexpected target change: {:?}", other),
        }
    }

    #[test]
    fn test_structured_query_round_trip() {
        let query = match query_params().target_type {
            FirestoreListenerTargetType::Query(query) => query,
            other => panic!("Unexpected target type: {:?}", other),
        };
        let grpc: StructuredQuery = (&query).into();
        let restored = FirestoreListenQuery::try_from((query.parent.clone(), &grpc)).unwrap();
        assert_eq!(restored.ordering(), query.ordering());
        assert_eq!(restored.collection_id, "cities");
    }
}
