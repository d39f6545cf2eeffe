use validator::Validate;

use crate::errors::AppError;

pub fn validate_payload<T: Validate>(payload: &T) -> Result<(), AppError> {
    payload.validate().map_err(AppError::from)
}

/// Both coordinates or neither.
pub fn validate_coordinate_pair(latitude: Option<f64>, longitude: Option<f64>) -> Result<(), AppError> {
    if latitude.is_some() != longitude.is_some() {
        return Err(AppError::BadRequest(
            "latitude and longitude must be given together".to_string(),
        ));
    }
    Ok(())
}
