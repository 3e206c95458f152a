//! Request validators. Each returns `Ok(())` or a `DomainError::Validation` whose message
//! is shown to the caller verbatim.

use marketlens_api_types::{
    AuthorRequest, BlogCreateRequest, BlogUpdateRequest, CategoryRequest,
    PressReleaseCreateRequest, PressReleaseUpdateRequest, ReportCreateRequest, ReportSection,
    ReportUpdateRequest, UserCreateRequest, UserUpdateRequest,
};

use super::error::DomainError;

pub const REPORT_TITLE_MIN: usize = 10;
pub const REPORT_SUMMARY_MIN: usize = 50;
pub const ARTICLE_TITLE_MIN: usize = 5;
pub const TITLE_MAX: usize = 500;
pub const PASSWORD_MIN: usize = 8;

pub trait Validate {
    fn validate(&self) -> Result<(), DomainError>;
}

fn char_len(value: &str) -> usize {
    value.trim().chars().count()
}

fn require_title(title: &str, min: usize) -> Result<(), DomainError> {
    if char_len(title) < min {
        return Err(DomainError::validation(format!(
            "Title is required (minimum {min} characters)"
        )));
    }
    if char_len(title) > TITLE_MAX {
        return Err(DomainError::validation(format!(
            "Title must be at most {TITLE_MAX} characters"
        )));
    }
    Ok(())
}

fn require_summary(summary: &str) -> Result<(), DomainError> {
    if char_len(summary) < REPORT_SUMMARY_MIN {
        return Err(DomainError::validation(format!(
            "Summary is required (minimum {REPORT_SUMMARY_MIN} characters)"
        )));
    }
    Ok(())
}

fn require_geography(geography: &[String]) -> Result<(), DomainError> {
    if geography.iter().all(|region| region.trim().is_empty()) {
        return Err(DomainError::validation(
            "At least one geography is required",
        ));
    }
    Ok(())
}

fn check_pricing(price: Option<f64>, discount: Option<f64>) -> Result<(), DomainError> {
    if let Some(price) = price
        && (!price.is_finite() || price < 0.0)
    {
        return Err(DomainError::validation("Price must be a non-negative number"));
    }
    if let Some(discount) = discount
        && (!discount.is_finite() || !(0.0..=100.0).contains(&discount))
    {
        return Err(DomainError::validation(
            "Discount must be between 0 and 100",
        ));
    }
    Ok(())
}

fn check_sections(sections: &[ReportSection]) -> Result<(), DomainError> {
    if sections.iter().any(|section| section.title.trim().is_empty()) {
        return Err(DomainError::validation("Every section needs a title"));
    }
    Ok(())
}

fn require_body(body: &str) -> Result<(), DomainError> {
    if body.trim().is_empty() {
        return Err(DomainError::validation("Body is required"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), DomainError> {
    let trimmed = email.trim();
    let valid = match trimmed.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
                && !trimmed.contains(char::is_whitespace)
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(DomainError::validation("A valid email address is required"))
    }
}

pub fn validate_password(password: &str) -> Result<(), DomainError> {
    if password.chars().count() < PASSWORD_MIN {
        return Err(DomainError::validation(format!(
            "Password must be at least {PASSWORD_MIN} characters"
        )));
    }
    Ok(())
}

fn require_name(name: &str) -> Result<(), DomainError> {
    if name.trim().is_empty() {
        return Err(DomainError::validation("Name is required"));
    }
    Ok(())
}

impl Validate for ReportCreateRequest {
    fn validate(&self) -> Result<(), DomainError> {
        require_title(&self.title, REPORT_TITLE_MIN)?;
        require_summary(&self.summary)?;
        require_geography(&self.geography)?;
        check_pricing(self.price, self.discount)?;
        check_sections(&self.sections)
    }
}

impl Validate for ReportUpdateRequest {
    fn validate(&self) -> Result<(), DomainError> {
        if let Some(title) = self.title.as_deref() {
            require_title(title, REPORT_TITLE_MIN)?;
        }
        if let Some(summary) = self.summary.as_deref() {
            require_summary(summary)?;
        }
        if let Some(geography) = self.geography.as_deref() {
            require_geography(geography)?;
        }
        if let Some(sections) = self.sections.as_deref() {
            check_sections(sections)?;
        }
        check_pricing(self.price, self.discount)
    }
}

impl Validate for BlogCreateRequest {
    fn validate(&self) -> Result<(), DomainError> {
        require_title(&self.title, ARTICLE_TITLE_MIN)?;
        require_body(&self.body)
    }
}

impl Validate for BlogUpdateRequest {
    fn validate(&self) -> Result<(), DomainError> {
        if let Some(title) = self.title.as_deref() {
            require_title(title, ARTICLE_TITLE_MIN)?;
        }
        if let Some(body) = self.body.as_deref() {
            require_body(body)?;
        }
        Ok(())
    }
}

impl Validate for PressReleaseCreateRequest {
    fn validate(&self) -> Result<(), DomainError> {
        require_title(&self.title, ARTICLE_TITLE_MIN)?;
        require_body(&self.body)?;
        if let Some(email) = self.contact_email.as_deref() {
            validate_email(email)?;
        }
        Ok(())
    }
}

impl Validate for PressReleaseUpdateRequest {
    fn validate(&self) -> Result<(), DomainError> {
        if let Some(title) = self.title.as_deref() {
            require_title(title, ARTICLE_TITLE_MIN)?;
        }
        if let Some(body) = self.body.as_deref() {
            require_body(body)?;
        }
        if let Some(email) = self.contact_email.as_deref() {
            validate_email(email)?;
        }
        Ok(())
    }
}

impl Validate for UserCreateRequest {
    fn validate(&self) -> Result<(), DomainError> {
        validate_email(&self.email)?;
        validate_password(&self.password)?;
        require_name(&self.name)
    }
}

impl Validate for UserUpdateRequest {
    fn validate(&self) -> Result<(), DomainError> {
        if let Some(email) = self.email.as_deref() {
            validate_email(email)?;
        }
        if let Some(name) = self.name.as_deref() {
            require_name(name)?;
        }
        if let Some(password) = self.password.as_deref() {
            validate_password(password)?;
        }
        Ok(())
    }
}

impl Validate for CategoryRequest {
    fn validate(&self) -> Result<(), DomainError> {
        require_name(&self.name)
    }
}

impl Validate for AuthorRequest {
    fn validate(&self) -> Result<(), DomainError> {
        require_name(&self.name)?;
        if let Some(email) = self.email.as_deref().filter(|value| !value.trim().is_empty()) {
            validate_email(email)?;
        }
        Ok(())
    }
}
