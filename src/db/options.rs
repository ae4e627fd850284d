use rsb_derive::Builder;

pub const FIRESTORE_DEFAULT_DATABASE_ID: &str = "(default)";

/// Connection settings of a [`FirestoreDb`](crate::FirestoreDb) client.
#[derive(Debug, Eq, PartialEq, Clone, Builder)]
pub struct FirestoreDbOptions {
    pub google_project_id: String,

    #[default = "FIRESTORE_DEFAULT_DATABASE_ID.to_string()"]
    pub database_id: String,

    /// Overrides the API endpoint. `FIRESTORE_EMULATOR_HOST` is used when not set.
    pub firebase_api_url: Option<String>,
}

impl FirestoreDbOptions {
    pub async fn for_default_project_id() -> Option<FirestoreDbOptions> {
        let google_project_id = gcloud_sdk::GoogleEnvironment::detect_google_project_id().await;

        google_project_id.map(FirestoreDbOptions::new)
    }
}
