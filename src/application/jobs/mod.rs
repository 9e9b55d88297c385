mod context;
mod mail;
mod queue;

pub use context::{JobWorkerContext, job_failed};
pub use mail::{
    MailError, MailJobPayload, Mailer, enqueue_mail_job, process_mail_job, welcome_mail,
};
pub use queue::enqueue_job;
