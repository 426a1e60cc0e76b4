use super::ApiError;

pub fn validate_record_id(id: i32) -> Result<i32, ApiError> {
    if id <= 0 {
        return Err(ApiError::validation(format!(
            "Invalid record ID: {id}. ID must be a positive integer"
        )));
    }
    Ok(id)
}
