use futures::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId};
use mongodb::Database;
use std::collections::HashSet;

use crate::errors::ApiError;
use crate::models::EnrollmentRecord;
use crate::utils::time::chrono_to_bson;

/// Gate between students and the content catalog: a user sees a subject
/// iff an enrollment row exists for the pair. Admin paths bypass this
/// service entirely.
pub struct EnrollmentService {
    mongo: Database,
}

impl EnrollmentService {
    pub fn new(mongo: Database) -> Self {
        Self { mongo }
    }

    /// Subjects the user may access. Empty enrollment yields an empty set,
    /// which downstream reads turn into empty listings, never an error.
    pub async fn allowed_subject_ids(
        &self,
        user_id: &ObjectId,
    ) -> Result<HashSet<ObjectId>, ApiError> {
        let collection = self.mongo.collection::<EnrollmentRecord>("enrollments");
        let rows: Vec<EnrollmentRecord> = collection
            .find(doc! { "user_id": user_id })
            .await?
            .try_collect()
            .await?;

        Ok(rows.into_iter().map(|row| row.subject_id).collect())
    }

    pub async fn is_enrolled(
        &self,
        user_id: &ObjectId,
        subject_id: &ObjectId,
    ) -> Result<bool, ApiError> {
        let collection = self.mongo.collection::<EnrollmentRecord>("enrollments");
        let existing = collection
            .find_one(doc! { "user_id": user_id, "subject_id": subject_id })
            .await?;
        Ok(existing.is_some())
    }

    /// Enroll or unenroll a student. Enrolling twice is a no-op: the
    /// compound unique index raises E11000 which is swallowed here.
    pub async fn set_enrollment(
        &self,
        user_id: &ObjectId,
        subject_id: &ObjectId,
        enroll: bool,
    ) -> Result<(), ApiError> {
        let collection = self.mongo.collection::<EnrollmentRecord>("enrollments");

        if enroll {
            let record = EnrollmentRecord {
                id: ObjectId::new(),
                user_id: *user_id,
                subject_id: *subject_id,
                created_at: chrono_to_bson(chrono::Utc::now()),
            };

            match collection.insert_one(&record).await {
                Ok(_) => {
                    tracing::info!(
                        "Enrolled user {} in subject {}",
                        user_id.to_hex(),
                        subject_id.to_hex()
                    );
                    Ok(())
                }
                Err(err) if is_duplicate_key_error(&err) => {
                    tracing::debug!(
                        "User {} already enrolled in subject {}",
                        user_id.to_hex(),
                        subject_id.to_hex()
                    );
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        } else {
            collection
                .delete_many(doc! { "user_id": user_id, "subject_id": subject_id })
                .await?;
            tracing::info!(
                "Unenrolled user {} from subject {}",
                user_id.to_hex(),
                subject_id.to_hex()
            );
            Ok(())
        }
    }

    /// Subject ids (hex) a given student is enrolled in, for the admin
    /// enrollment screen.
    pub async fn enrollments_for(&self, user_id: &ObjectId) -> Result<Vec<String>, ApiError> {
        let ids = self.allowed_subject_ids(user_id).await?;
        Ok(ids.into_iter().map(|id| id.to_hex()).collect())
    }
}

fn is_duplicate_key_error(err: &mongodb::error::Error) -> bool {
    matches!(
        *err.kind,
        mongodb::error::ErrorKind::Write(mongodb::error::WriteFailure::WriteError(ref we))
            if we.code == 11000
    )
}
