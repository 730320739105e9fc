//! Course (organization) provisioning
//!
//! A course is a private organization on the platform. `ensure_course`
//! creates it when absent and corrects its visibility when it has drifted,
//! which covers both the explicit `create-course` command and the
//! pre-flight check a sync run performs.

use classops_remote::{CreateOutcome, RemoteResult, RemoteStateClient, Visibility};
use tracing::{info, warn};

use crate::config::RunConfig;

/// What `ensure_course` found and did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CourseOutcome {
    /// The organization was created
    Created,
    /// The organization already existed with the right settings
    Existed,
    /// The organization existed but its visibility was corrected to private
    VisibilityFixed,
}

/// Make sure the course organization exists and is private.
pub async fn ensure_course(
    remote: &dyn RemoteStateClient,
    config: &RunConfig,
    course: &str,
) -> RemoteResult<CourseOutcome> {
    let retry = &config.retry;

    let existing = retry
        .run("get_course", || remote.get_course(course))
        .await?;

    match existing {
        Some(state) if state.visibility == Visibility::Private => Ok(CourseOutcome::Existed),
        Some(state) => {
            warn!(
                course,
                visibility = %state.visibility,
                "course visibility drifted, forcing private"
            );
            retry
                .run("set_course_visibility", || {
                    remote.set_course_visibility(course, Visibility::Private)
                })
                .await?;
            Ok(CourseOutcome::VisibilityFixed)
        }
        None => {
            let outcome = retry
                .run("create_course", || remote.create_course(course))
                .await?;
            match outcome {
                CreateOutcome::Created => {
                    info!(course, "course created");
                    Ok(CourseOutcome::Created)
                }
                CreateOutcome::AlreadyExists => Ok(CourseOutcome::Existed),
            }
        }
    }
}
