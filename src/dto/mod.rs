pub mod answer_dto;
pub mod test_dto;
