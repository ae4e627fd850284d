use crate::errors::*;
use crate::timestamp_utils::from_opt_timestamp;
use crate::{FirestoreDocument, FirestoreListenerToken, FirestoreResult};
use chrono::prelude::*;
use gcloud_sdk::google::firestore::v1::*;
use rvstruct::ValueStruct;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirestoreTargetChangeType {
    /// Checkpoint: only the resume token and the read time advance.
    NoChange,
    Add,
    Remove,
    /// The target reflects every change committed before it was added.
    Current,
    /// The target must be rebuilt from scratch.
    Reset,
}

impl TryFrom<i32> for FirestoreTargetChangeType {
    type Error = FirestoreError;

    fn try_from(value: i32) -> FirestoreResult<Self> {
        match target_change::TargetChangeType::try_from(value) {
            Ok(target_change::TargetChangeType::NoChange) => Ok(Self::NoChange),
            Ok(target_change::TargetChangeType::Add) => Ok(Self::Add),
            Ok(target_change::TargetChangeType::Remove) => Ok(Self::Remove),
            Ok(target_change::TargetChangeType::Current) => Ok(Self::Current),
            Ok(target_change::TargetChangeType::Reset) => Ok(Self::Reset),
            Err(_) => Err(FirestoreError::SystemError(FirestoreSystemError::new(
                FirestoreErrorPublicGenericDetails::new("UnknownTargetChangeType".into()),
                format!("Unknown target change type received: {}", value),
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FirestoreWatchTargetChange {
    pub change_type: FirestoreTargetChangeType,
    pub target_ids: Vec<i32>,
    pub cause: Option<gcloud_sdk::google::rpc::Status>,
    pub resume_token: FirestoreListenerToken,
    pub read_time: Option<DateTime<Utc>>,
}

/// A decoded `ListenResponse`.
#[derive(Debug, Clone, PartialEq)]
pub enum FirestoreWatchEvent {
    TargetChange(FirestoreWatchTargetChange),
    DocumentChange {
        document: FirestoreDocument,
        target_ids: Vec<i32>,
        removed_target_ids: Vec<i32>,
    },
    DocumentDelete {
        path: String,
        removed_target_ids: Vec<i32>,
        read_time: Option<DateTime<Utc>>,
    },
    DocumentRemove {
        path: String,
        removed_target_ids: Vec<i32>,
        read_time: Option<DateTime<Utc>>,
    },
    ExistenceFilter {
        target_id: i32,
        count: i32,
    },
}

impl TryFrom<ListenResponse> for FirestoreWatchEvent {
    type Error = FirestoreError;

    fn try_from(response: ListenResponse) -> FirestoreResult<Self> {
        match response.response_type {
            Some(listen_response::ResponseType::TargetChange(change)) => {
                Ok(FirestoreWatchEvent::TargetChange(FirestoreWatchTargetChange {
                    change_type: change.target_change_type.try_into()?,
                    target_ids: change.target_ids,
                    cause: change.cause,
                    resume_token: FirestoreListenerToken::new(change.resume_token),
                    read_time: from_opt_timestamp(change.read_time)?,
                }))
            }
            Some(listen_response::ResponseType::DocumentChange(change)) => {
                let document = change.document.ok_or_else(|| {
                    FirestoreError::SystemError(FirestoreSystemError::new(
                        FirestoreErrorPublicGenericDetails::new("MissingDocument".into()),
                        "Document change received without a document".into(),
                    ))
                })?;
                Ok(FirestoreWatchEvent::DocumentChange {
                    document,
                    target_ids: change.target_ids,
                    removed_target_ids: change.removed_target_ids,
                })
            }
            Some(listen_response::ResponseType::DocumentDelete(delete)) => {
                Ok(FirestoreWatchEvent::DocumentDelete {
                    path: delete.document,
                    removed_target_ids: delete.removed_target_ids,
                    read_time: from_opt_timestamp(delete.read_time)?,
                })
            }
            Some(listen_response::ResponseType::DocumentRemove(remove)) => {
                Ok(FirestoreWatchEvent::DocumentRemove {
                    path: remove.document,
                    removed_target_ids: remove.removed_target_ids,
                    read_time: from_opt_timestamp(remove.read_time)?,
                })
            }
            Some(listen_response::ResponseType::Filter(filter)) => {
                Ok(FirestoreWatchEvent::ExistenceFilter {
                    target_id: filter.target_id,
                    count: filter.count,
                })
            }
            None => Err(FirestoreError::SystemError(FirestoreSystemError::new(
                FirestoreErrorPublicGenericDetails::new("UnknownResponseType".into()),
                "Listen response received without a payload".into(),
            ))),
        }
    }
}

impl FirestoreWatchEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            FirestoreWatchEvent::TargetChange(_) => "target_change",
            FirestoreWatchEvent::DocumentChange { .. } => "document_change",
            FirestoreWatchEvent::DocumentDelete { .. } => "document_delete",
            FirestoreWatchEvent::DocumentRemove { .. } => "document_remove",
            FirestoreWatchEvent::ExistenceFilter { .. } => "existence_filter",
        }
    }
}

impl FirestoreWatchTargetChange {
    /// A non-empty resume token, if the server sent one.
    pub fn token(&self) -> Option<&FirestoreListenerToken> {
        if self.resume_token.value().is_empty() {
            None
        } else {
            Some(&self.resume_token)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timestamp_utils::to_timestamp;

    #[test]
    fn test_decode_target_change() {
        let read_time = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let event: FirestoreWatchEvent = ListenResponse {
            response_type: Some(listen_response::ResponseType::TargetChange(TargetChange {
                target_change_type: target_change::TargetChangeType::Current as i32,
                target_ids: vec![0x42],
                cause: None,
                resume_token: vec![7, 7],
                read_time: Some(to_timestamp(read_time)),
            })),
        }
        .try_into()
        .unwrap();

        match event {
            FirestoreWatchEvent::TargetChange(change) => {
                assert_eq!(change.change_type, FirestoreTargetChangeType::Current);
                assert_eq!(change.target_ids, vec![0x42]);
                assert_eq!(change.token(), Some(&FirestoreListenerToken::new(vec![7, 7])));
                assert_eq!(change.read_time, Some(read_time));
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_decode_document_events() {
        let event: FirestoreWatchEvent = ListenResponse {
            response_type: Some(listen_response::ResponseType::DocumentChange(DocumentChange {
                document: Some(Document {
                    name: "projects/p/databases/(default)/documents/c/a".into(),
                    ..Default::default()
                }),
                target_ids: vec![0x42],
                removed_target_ids: vec![],
            })),
        }
        .try_into()
        .unwrap();
        assert_eq!(event.kind(), "document_change");

        let event: FirestoreWatchEvent = ListenResponse {
            response_type: Some(listen_response::ResponseType::DocumentRemove(DocumentRemove {
                document: "projects/p/databases/(default)/documents/c/a".into(),
                removed_target_ids: vec![0x42],
                read_time: None,
            })),
        }
        .try_into()
        .unwrap();
        assert_eq!(
            event,
            FirestoreWatchEvent::DocumentRemove {
                path: "projects/p/databases/(default)/documents/c/a".into(),
                removed_target_ids: vec![0x42],
                read_time: None,
            }
        );

        let event: FirestoreWatchEvent = ListenResponse {
            response_type: Some(listen_response::ResponseType::Filter(ExistenceFilter {
                target_id: 0x42,
                count: 3,
                ..Default::default()
            })),
        }
        .try_into()
        .unwrap();
        assert_eq!(
            event,
            FirestoreWatchEvent::ExistenceFilter {
                target_id: 0x42,
                count: 3
            }
        );
    }

    #[test]
    fn test_unclassified_responses() {
        let empty: FirestoreResult<FirestoreWatchEvent> = ListenResponse {
            response_type: None,
        }
        .try_into();
        assert!(matches!(empty, Err(FirestoreError::SystemError(_))));

        let unknown_type: FirestoreResult<FirestoreWatchEvent> = ListenResponse {
            response_type: Some(listen_response::ResponseType::TargetChange(TargetChange {
                target_change_type: 42,
                ..Default::default()
            })),
        }
        .try_into();
        assert!(matches!(unknown_type, Err(FirestoreError::SystemError(_))));

        let missing_document: FirestoreResult<FirestoreWatchEvent> = ListenResponse {
            response_type: Some(listen_response::ResponseType::DocumentChange(
                DocumentChange::default(),
            )),
        }
        .try_into();
        assert!(missing_document.is_err());
    }
}
