use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

/// Join record in the "enrollments" collection. Existence implies access;
/// uniqueness per (user, subject) is guaranteed by a compound index and
/// duplicate inserts are treated as a no-op.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrollmentRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub subject_id: ObjectId,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: BsonDateTime,
}

#[derive(Debug, Deserialize)]
pub struct EnrollmentToggleRequest {
    pub user_id: String,
    pub subject_id: String,
    pub enroll: bool,
}

/// Admin view of a student row on the enrollment screen.
#[derive(Debug, Serialize)]
pub struct StudentSummary {
    pub id: String,
    pub name: String,
    pub email: String,
}
