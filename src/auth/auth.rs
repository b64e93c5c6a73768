use axum::{http::StatusCode, Json};
use crate::models::ErrorResponse;

const CLOUD_ADMIN_PRPL: &str = "r/Colabri-CloudAdmin";

pub fn is_cloud_admin(prpls: &[String]) -> bool {
    prpls.iter().any(|p| p == CLOUD_ADMIN_PRPL)
}

pub fn is_service(prpls: &[String], service_name: &str) -> bool {
    let service_prpl = format!("s/{}", service_name);
    prpls.iter().any(|p| p == &service_prpl)
}

/// Workspace members carry a `{workspace_id}/u/{uid}` principal
pub fn is_workspace_member(prpls: &[String], workspace_id: &str) -> bool {
    if is_cloud_admin(prpls) {
        return true;
    }

    let member_prefix = format!("{}/u/", workspace_id);
    prpls.iter().any(|p| p.starts_with(&member_prefix))
}

pub fn ensure_workspace_member(prpls: &[String], workspace_id: &str) -> Result<(), (StatusCode, Json<ErrorResponse>)> {
    if is_workspace_member(prpls, workspace_id) {
        return Ok(());
    }

    let status = StatusCode::FORBIDDEN;
    Err((status, Json(ErrorResponse::new(
        status,
        format!("User is not a member of workspace '{}'", workspace_id),
    ))))
}

/// System broadcasts come from sibling services or cloud admins
pub fn ensure_service_or_cloud_admin(prpls: &[String]) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    if let Some(p) = prpls.iter().find(|p| p.starts_with("s/")) {
        return Ok(p.to_string());
    }

    if is_cloud_admin(prpls) {
        return Ok(CLOUD_ADMIN_PRPL.to_string());
    }

    let status = StatusCode::FORBIDDEN;
    Err((status, Json(ErrorResponse::new(status, "Service access required"))))
}

pub fn ensure_cloud_admin(prpls: &[String]) -> Result<String, (StatusCode, Json<ErrorResponse>)> {
    if is_cloud_admin(prpls) {
        return Ok(CLOUD_ADMIN_PRPL.to_string());
    }

    let status = StatusCode::FORBIDDEN;
    Err((status, Json(ErrorResponse::new(status, "Cloud Admin access required"))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_follows_workspace_prefixed_principals() {
        let prpls = vec!["7/u/alice".to_string(), "r/Viewer".to_string()];
        assert!(is_workspace_member(&prpls, "7"));
        assert!(!is_workspace_member(&prpls, "8"));
    }

    #[test]
    fn cloud_admin_is_member_everywhere() {
        let prpls = vec![CLOUD_ADMIN_PRPL.to_string()];
        assert!(is_workspace_member(&prpls, "7"));
        assert!(is_workspace_member(&prpls, "anything"));
        assert!(ensure_service_or_cloud_admin(&prpls).is_ok());
    }

    #[test]
    fn service_principal_passes_broadcast_check() {
        let prpls = vec!["s/colabri-app".to_string()];
        assert!(is_service(&prpls, "colabri-app"));
        assert!(ensure_service_or_cloud_admin(&prpls).is_ok());
        assert!(ensure_cloud_admin(&prpls).is_err());
    }
}
