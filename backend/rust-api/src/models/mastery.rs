use mongodb::bson::{oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

/// Per-(user, question) counter in the "mastery" collection.
///
/// Created on the first correct answer with `correct_count = 1` and only
/// ever incremented after that; incorrect answers never touch it. A
/// question counts as mastered once `correct_count` reaches the owning
/// subject's threshold.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryRecord {
    #[serde(rename = "_id")]
    pub id: ObjectId,
    pub user_id: ObjectId,
    pub question_id: ObjectId,
    pub correct_count: i32,
    #[serde(rename = "lastAnsweredAt", alias = "last_answered_at")]
    pub last_answered_at: BsonDateTime,
}

impl MasteryRecord {
    pub fn is_mastered(&self, threshold: i32) -> bool {
        self.correct_count >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::doc;

    #[test]
    fn mastered_at_threshold_boundary() {
        let record = MasteryRecord {
            id: ObjectId::new(),
            user_id: ObjectId::new(),
            question_id: ObjectId::new(),
            correct_count: 3,
            last_answered_at: BsonDateTime::now(),
        };

        assert!(record.is_mastered(3));
        assert!(record.is_mastered(2));
        assert!(!record.is_mastered(4));
    }

    #[test]
    fn accepts_snake_case_timestamp() {
        let doc = doc! {
            "_id": ObjectId::new(),
            "user_id": ObjectId::new(),
            "question_id": ObjectId::new(),
            "correct_count": 1,
            "last_answered_at": BsonDateTime::now(),
        };

        let parsed: MasteryRecord = mongodb::bson::from_document(doc).unwrap();
        assert_eq!(parsed.correct_count, 1);
    }
}
