//! Input validation for the HTTP surface. Pure functions: each endpoint
//! schema maps a raw request to its normalized form or to the full list of
//! field-level errors, before any domain call runs.

use lazy_static::lazy_static;
use regex::Regex;

use crate::auth::dto::{
    EmailRequest, ProfileUpdateData, ResetPasswordData, ResetPasswordRequest, SignInData,
    SignInRequest, SignUpData, SignUpRequest, UpdateProfileRequest, VerifyOtpData,
    VerifyOtpRequest,
};
use crate::error::{ApiError, FieldError};

lazy_static! {
    static ref EMAIL_RE: Regex = Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap();
    static ref USER_NAME_RE: Regex = Regex::new(r"^[a-zA-Z0-9_]+$").unwrap();
    static ref LETTERS_RE: Regex = Regex::new(r"^[A-Za-z]+$").unwrap();
}

fn require<'a>(
    field: &'static str,
    value: &'a Option<String>,
    errors: &mut Vec<FieldError>,
) -> Option<&'a str> {
    match value {
        Some(value) => Some(value.as_str()),
        None => {
            errors.push(FieldError::new(field, "Required"));
            None
        }
    }
}

/// Trimmed and lower-cased; 3-20 chars of letters, digits and underscores.
fn check_user_name(value: &str, errors: &mut Vec<FieldError>) -> String {
    let value = value.trim();
    let len = value.chars().count();
    if len < 3 {
        errors.push(FieldError::new(
            "userName",
            "Username must be at least 3 characters",
        ));
    }
    if len > 20 {
        errors.push(FieldError::new(
            "userName",
            "Username must be at most 20 characters",
        ));
    }
    if !USER_NAME_RE.is_match(value) {
        errors.push(FieldError::new(
            "userName",
            "Username can only contain letters, numbers, and underscores",
        ));
    }
    value.to_lowercase()
}

/// Trimmed and lower-cased.
fn check_email(value: &str, errors: &mut Vec<FieldError>) -> String {
    let value = value.trim();
    if !EMAIL_RE.is_match(value) {
        errors.push(FieldError::new("email", "Invalid email format"));
    }
    value.to_lowercase()
}

/// Passwords are taken verbatim: 6-30 chars with at least one lowercase
/// letter, one uppercase letter and one digit.
fn check_password(value: &str, errors: &mut Vec<FieldError>) {
    let len = value.chars().count();
    if len < 6 {
        errors.push(FieldError::new(
            "password",
            "Password must be at least 6 characters",
        ));
    }
    if len > 30 {
        errors.push(FieldError::new(
            "password",
            "Password must be at most 30 characters",
        ));
    }
    let has_lower = value.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = value.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        errors.push(FieldError::new(
            "password",
            "Password must contain at least one uppercase letter, one lowercase letter, and one number",
        ));
    }
}

fn check_confirm_password(value: &str, errors: &mut Vec<FieldError>) {
    let len = value.chars().count();
    if len < 6 {
        errors.push(FieldError::new(
            "confirmPassword",
            "Confirm password must be at least 6 characters",
        ));
    }
    if len > 30 {
        errors.push(FieldError::new(
            "confirmPassword",
            "Confirm password must be at most 30 characters",
        ));
    }
}

/// Trimmed, letters only, first letter upper-cased for storage.
fn check_person_name(
    field: &'static str,
    label: &str,
    value: &str,
    errors: &mut Vec<FieldError>,
) -> String {
    let value = value.trim();
    let len = value.chars().count();
    if len < 3 {
        errors.push(FieldError::new(
            field,
            format!("{label} must be at least 3 characters"),
        ));
    }
    if len > 20 {
        errors.push(FieldError::new(
            field,
            format!("{label} must be at most 20 characters"),
        ));
    }
    if !LETTERS_RE.is_match(value) {
        errors.push(FieldError::new(field, format!("{label} can only contain letters")));
    }
    capitalize(value)
}

/// OTPs and reset tokens are 6-character codes, compared after trimming.
fn check_code(
    field: &'static str,
    label: &str,
    value: &str,
    errors: &mut Vec<FieldError>,
) -> String {
    let value = value.trim();
    if value.chars().count() != 6 || !value.chars().all(|c| c.is_ascii_digit()) {
        errors.push(FieldError::new(field, format!("{label} must be 6 digits")));
    }
    value.to_string()
}

fn check_gender(value: &str, errors: &mut Vec<FieldError>) -> String {
    if value != "male" && value != "female" {
        errors.push(FieldError::new(
            "gender",
            "Gender must be either male or female",
        ));
    }
    value.to_string()
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

pub fn sign_up(req: SignUpRequest) -> Result<SignUpData, ApiError> {
    let mut errors = Vec::new();
    let user_name =
        require("userName", &req.user_name, &mut errors).map(|v| check_user_name(v, &mut errors));
    let email = require("email", &req.email, &mut errors).map(|v| check_email(v, &mut errors));
    let password = require("password", &req.password, &mut errors).map(|v| {
        check_password(v, &mut errors);
        v.to_string()
    });
    let first_name = req
        .first_name
        .as_deref()
        .map(|v| check_person_name("firstName", "First name", v, &mut errors));
    let last_name = req
        .last_name
        .as_deref()
        .map(|v| check_person_name("lastName", "Last name", v, &mut errors));
    let gender = req.gender.as_deref().map(|v| check_gender(v, &mut errors));
    let bio = req.bio.as_deref().map(|v| v.trim().to_string());

    match (user_name, email, password) {
        (Some(user_name), Some(email), Some(password)) if errors.is_empty() => Ok(SignUpData {
            user_name,
            email,
            password,
            first_name,
            last_name,
            gender,
            bio,
        }),
        _ => Err(ApiError::Validation(errors)),
    }
}

pub fn sign_in(req: SignInRequest) -> Result<SignInData, ApiError> {
    let mut errors = Vec::new();
    let email = require("email", &req.email, &mut errors).map(|v| check_email(v, &mut errors));
    let password = require("password", &req.password, &mut errors).map(|v| {
        check_password(v, &mut errors);
        v.to_string()
    });

    match (email, password) {
        (Some(email), Some(password)) if errors.is_empty() => Ok(SignInData { email, password }),
        _ => Err(ApiError::Validation(errors)),
    }
}

pub fn verify_otp(req: VerifyOtpRequest) -> Result<VerifyOtpData, ApiError> {
    let mut errors = Vec::new();
    let email = require("email", &req.email, &mut errors).map(|v| check_email(v, &mut errors));
    let otp =
        require("otp", &req.otp, &mut errors).map(|v| check_code("otp", "OTP", v, &mut errors));

    match (email, otp) {
        (Some(email), Some(otp)) if errors.is_empty() => Ok(VerifyOtpData { email, otp }),
        _ => Err(ApiError::Validation(errors)),
    }
}

/// OTP reissue and forgot-password both take the account email alone.
pub fn email_only(req: EmailRequest) -> Result<String, ApiError> {
    let mut errors = Vec::new();
    let email = require("email", &req.email, &mut errors).map(|v| check_email(v, &mut errors));

    match email {
        Some(email) if errors.is_empty() => Ok(email),
        _ => Err(ApiError::Validation(errors)),
    }
}

pub fn reset_password(req: ResetPasswordRequest) -> Result<ResetPasswordData, ApiError> {
    let mut errors = Vec::new();
    let token = require("token", &req.token, &mut errors)
        .map(|v| check_code("token", "Reset token", v, &mut errors));
    let password = require("password", &req.password, &mut errors).map(|v| {
        check_password(v, &mut errors);
        v.to_string()
    });
    let confirm = require("confirmPassword", &req.confirm_password, &mut errors).map(|v| {
        check_confirm_password(v, &mut errors);
        v.to_string()
    });

    // Equality is only checked once both fields pass their own rules.
    if errors.is_empty() {
        if let (Some(password), Some(confirm)) = (&password, &confirm) {
            if password != confirm {
                errors.push(FieldError::new("confirmPassword", "Passwords do not match"));
            }
        }
    }

    match (token, password) {
        (Some(token), Some(password)) if errors.is_empty() => {
            Ok(ResetPasswordData { token, password })
        }
        _ => Err(ApiError::Validation(errors)),
    }
}

pub fn update_profile(req: UpdateProfileRequest) -> Result<ProfileUpdateData, ApiError> {
    let mut errors = Vec::new();
    let data = ProfileUpdateData {
        user_name: req
            .user_name
            .as_deref()
            .map(|v| check_user_name(v, &mut errors)),
        first_name: req
            .first_name
            .as_deref()
            .map(|v| check_person_name("firstName", "First name", v, &mut errors)),
        last_name: req
            .last_name
            .as_deref()
            .map(|v| check_person_name("lastName", "Last name", v, &mut errors)),
        gender: req.gender.as_deref().map(|v| check_gender(v, &mut errors)),
        bio: req.bio.as_deref().map(|v| v.trim().to_string()),
    };

    if errors.is_empty() {
        Ok(data)
    } else {
        Err(ApiError::Validation(errors))
    }
}
