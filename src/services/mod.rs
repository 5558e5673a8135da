pub mod answer_service;
pub mod attempt_service;
pub mod blob_service;
pub mod grading_service;
pub mod notification_service;
pub mod test_service;
