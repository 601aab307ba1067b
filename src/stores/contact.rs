use chrono::Utc;
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::{new_id, Session},
    error::{AppError, AppResult},
    models::{ContactStatus, ContactSubmission, Role},
};

#[derive(Debug, Clone, Deserialize)]
pub struct ContactForm {
    pub name: String,
    pub email: String,
    pub subject: String,
    pub message: String,
}

pub async fn submit_contact(pool: &SqlitePool, form: ContactForm) -> AppResult<ContactSubmission> {
    let name = form.name.trim();
    let email = form.email.trim();
    let subject = form.subject.trim();
    let message = form.message.trim();
    if name.is_empty() || subject.is_empty() || message.is_empty() {
        return Err(AppError::validation("Name, subject and message are required."));
    }
    if !email.contains('@') {
        return Err(AppError::validation("A valid email is required."));
    }

    let submission = ContactSubmission {
        id: new_id(),
        name: name.to_string(),
        email: email.to_lowercase(),
        subject: subject.to_string(),
        message: message.to_string(),
        status: ContactStatus::New,
        created_at: Utc::now(),
    };
    sqlx::query(
        r#"INSERT INTO contact_submissions (id, name, email, subject, message, status, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&submission.id)
    .bind(&submission.name)
    .bind(&submission.email)
    .bind(&submission.subject)
    .bind(&submission.message)
    .bind(submission.status)
    .bind(submission.created_at)
    .execute(pool)
    .await?;

    log::info!("Contact message from {}: {}", submission.email, submission.subject);
    Ok(submission)
}

pub async fn list_submissions(pool: &SqlitePool, session: &Session) -> AppResult<Vec<ContactSubmission>> {
    session.require(Role::Admin)?;
    let submissions = sqlx::query_as::<_, ContactSubmission>(
        r#"SELECT id, name, email, subject, message, status, created_at
           FROM contact_submissions
           ORDER BY created_at DESC"#,
    )
    .fetch_all(pool)
    .await?;
    Ok(submissions)
}

pub async fn mark_handled(pool: &SqlitePool, session: &Session, submission_id: &str) -> AppResult<()> {
    session.require(Role::Admin)?;
    let result = sqlx::query("UPDATE contact_submissions SET status = ? WHERE id = ?")
        .bind(ContactStatus::Handled)
        .bind(submission_id)
        .execute(pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("contact submission"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{admin, client, test_pool};

    fn form() -> ContactForm {
        ContactForm {
            name: "Dana".into(),
            email: " Dana@Example.com ".into(),
            subject: "Partnership".into(),
            message: "Can we list our plumbers?".into(),
        }
    }

    #[actix_web::test]
    async fn admin_handles_submissions() {
        let pool = test_pool().await;
        let boss = admin(&pool).await;
        let cam = client(&pool, "cam@example.com").await;

        let submission = submit_contact(&pool, form()).await.unwrap();
        assert_eq!(submission.email, "dana@example.com");
        assert_eq!(submission.status, ContactStatus::New);

        assert!(matches!(list_submissions(&pool, &cam).await, Err(AppError::Forbidden)));
        mark_handled(&pool, &boss, &submission.id).await.unwrap();
        let listed = list_submissions(&pool, &boss).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].status, ContactStatus::Handled);

        assert!(matches!(
            mark_handled(&pool, &boss, "missing").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[actix_web::test]
    async fn blank_fields_are_rejected() {
        let pool = test_pool().await;
        let mut blank = form();
        blank.message = "   ".into();
        assert!(matches!(
            submit_contact(&pool, blank).await,
            Err(AppError::Validation(_))
        ));
        let mut bad_email = form();
        bad_email.email = "dana".into();
        assert!(matches!(
            submit_contact(&pool, bad_email).await,
            Err(AppError::Validation(_))
        ));
    }
}
