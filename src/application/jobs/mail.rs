use apalis::prelude::{Data, Error as ApalisError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::application::repos::{JobsRepo, RepoError};
use crate::domain::entities::UserRecord;
use crate::domain::types::JobType;

use super::context::{JobWorkerContext, job_failed};
use super::queue::enqueue_job;

const MAIL_MAX_ATTEMPTS: i32 = 5;
const MAIL_PRIORITY: i32 = 0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailJobPayload {
    pub to: String,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("mail transport failed: {0}")]
    Transport(String),
    #[error("mail provider rejected message with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &MailJobPayload) -> Result<(), MailError>;
}

pub fn welcome_mail(user: &UserRecord) -> MailJobPayload {
    MailJobPayload {
        to: user.email.clone(),
        subject: "Welcome to the course platform".to_string(),
        html: format!(
            "<p>Hi {},</p><p>Your account <strong>{}</strong> is ready. Happy learning!</p>",
            user.nickname, user.username
        ),
    }
}

pub async fn enqueue_mail_job<J: JobsRepo + ?Sized>(
    repo: &J,
    payload: &MailJobPayload,
) -> Result<String, RepoError> {
    enqueue_job(
        repo,
        JobType::SendMail,
        payload,
        None,
        MAIL_MAX_ATTEMPTS,
        MAIL_PRIORITY,
    )
    .await
}

pub async fn process_mail_job(
    payload: MailJobPayload,
    context: Data<JobWorkerContext>,
) -> Result<(), ApalisError> {
    context.mailer.send(&payload).await.map_err(job_failed)?;
    info!(
        target = "application::jobs::process_mail_job",
        to = %payload.to,
        subject = %payload.subject,
        "mail delivered"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use time::macros::datetime;

    use super::*;
    use crate::application::repos::NewJobRecord;

    #[derive(Default)]
    struct RecordingJobs {
        jobs: Mutex<Vec<NewJobRecord>>,
    }

    #[async_trait]
    impl JobsRepo for RecordingJobs {
        async fn enqueue_job(&self, job: NewJobRecord) -> Result<String, RepoError> {
            let mut jobs = self.jobs.lock().unwrap();
            jobs.push(job);
            Ok(format!("job-{}", jobs.len()))
        }
    }

    fn user() -> UserRecord {
        UserRecord {
            id: 1,
            email: "ada@example.com".into(),
            username: "ada".into(),
            nickname: "Ada".into(),
            avatar: None,
            sex: 2,
            company: None,
            introduce: None,
            role: 0,
            openid: None,
            created_at: datetime!(2025-01-01 00:00 UTC),
            updated_at: datetime!(2025-01-01 00:00 UTC),
        }
    }

    #[tokio::test]
    async fn welcome_mail_is_queued_as_send_mail() {
        let repo = RecordingJobs::default();
        let id = enqueue_mail_job(&repo, &welcome_mail(&user())).await.unwrap();
        assert_eq!(id, "job-1");

        let jobs = repo.jobs.lock().unwrap();
        assert_eq!(jobs[0].job_type, JobType::SendMail);
        assert_eq!(jobs[0].payload["to"], "ada@example.com");
        assert_eq!(jobs[0].max_attempts, MAIL_MAX_ATTEMPTS);
    }
}
