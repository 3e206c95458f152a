use crate::application::repos::RepoError;

const UNIQUE_VIOLATION: &str = "23505";
const FOREIGN_KEY_VIOLATION: &str = "23503";
const INVALID_TEXT_REPRESENTATION: &str = "22P02";
const QUERY_CANCELED: &str = "57014";

/// `%term%` for an `ILIKE ... ESCAPE '\'` match, with the term's own wildcards escaped.
pub fn contains_pattern(term: &str) -> String {
    let mut pattern = String::with_capacity(term.len() + 2);
    pattern.push('%');
    for ch in term.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

/// Classify a driver error by SQLSTATE so services can react to constraint outcomes.
pub fn map_sqlx_error(err: sqlx::Error) -> RepoError {
    match err {
        sqlx::Error::RowNotFound => RepoError::NotFound,
        sqlx::Error::PoolTimedOut => RepoError::Timeout,
        sqlx::Error::Database(db) => {
            let code = db.code();
            match code.as_deref() {
                Some(UNIQUE_VIOLATION) => RepoError::Duplicate {
                    constraint: db.constraint().unwrap_or("unknown").to_string(),
                },
                Some(FOREIGN_KEY_VIOLATION) | Some(INVALID_TEXT_REPRESENTATION) => {
                    RepoError::InvalidInput {
                        message: db.message().to_string(),
                    }
                }
                Some(QUERY_CANCELED) => RepoError::Timeout,
                Some(class) if class.starts_with("23") => RepoError::Integrity {
                    message: db.message().to_string(),
                },
                _ => RepoError::Persistence(db.to_string()),
            }
        }
        other => RepoError::from_persistence(other),
    }
}
