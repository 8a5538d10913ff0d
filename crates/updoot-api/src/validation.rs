use updoot_types::api::{FieldError, RegisterRequest};

/// Check registration input. Stops at the first problem, so the client
/// shows one message at a time.
pub fn validate_register(req: &RegisterRequest) -> Option<Vec<FieldError>> {
    let problem = if !req.email.contains('@') {
        FieldError::new("email", "invalid email")
    } else if req.username.chars().count() <= 2 {
        FieldError::new("username", "length must be greater than 2")
    } else if req.username.contains('@') {
        FieldError::new("username", "cannot include an @")
    } else if req.password.chars().count() <= 2 {
        FieldError::new("password", "length must be greater than 2")
    } else {
        return None;
    };

    Some(vec![problem])
}
