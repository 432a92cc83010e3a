mod common;

use anyhow::Result;
use common::{Org, PASSWORD, leave, test_service};
use leavebook::application::{AppError, ErrorKind};
use leavebook::domain::{AuditAction, Role};

#[tokio::test]
async fn test_manager_sees_only_direct_reports() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Org::create(&service).await?;

    service
        .submit_request(&org.e1, leave("E1", "annual", "2024-03-01", "2024-03-02"))
        .await?;
    service
        .submit_request(&org.e2, leave("E2", "sick", "2024-03-04", "2024-03-04"))
        .await?;
    service
        .submit_request(&org.manager, leave("M1", "annual", "2024-04-01", "2024-04-01"))
        .await?;

    let visible = service.list_visible_requests(&org.manager).await?;
    assert_eq!(visible.len(), 1);
    for request in &visible {
        let employee = service.get_employee(&org.admin, &request.employee_id).await?;
        assert_eq!(employee.direct_manager_id.as_deref(), Some("M1"));
    }

    let visible = service.list_visible_requests(&org.manager2).await?;
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].employee_id, "E2");

    assert_eq!(service.list_visible_requests(&org.officer).await?.len(), 3);
    assert_eq!(service.list_visible_requests(&org.admin).await?.len(), 3);

    let own = service.list_visible_requests(&org.e1).await?;
    assert_eq!(own.len(), 1);
    assert_eq!(own[0].employee_id, "E1");

    // A manager's own requests are listed separately
    assert_eq!(service.list_own_requests(&org.manager).await?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn test_manager_cannot_review_other_team() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Org::create(&service).await?;

    let request = service
        .submit_request(&org.e2, leave("E2", "annual", "2024-03-01", "2024-03-02"))
        .await?
        .request;

    let err = service
        .approve_request(&org.manager, request.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden { .. }));

    let err = service
        .reject_request(&org.manager, request.id, "No")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let stored = service.get_request(&org.e2, request.id).await?;
    assert!(stored.is_pending());

    Ok(())
}

#[tokio::test]
async fn test_employee_cannot_review() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Org::create(&service).await?;

    let request = service
        .submit_request(&org.e1, leave("E1", "annual", "2024-03-01", "2024-03-02"))
        .await?
        .request;

    let err = service
        .approve_request(&org.e1, request.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = service
        .approve_request(&org.e2, request.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    Ok(())
}

#[tokio::test]
async fn test_request_visibility() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Org::create(&service).await?;

    let request = service
        .submit_request(&org.e1, leave("E1", "annual", "2024-03-01", "2024-03-02"))
        .await?
        .request;

    assert_eq!(service.get_request(&org.e1, request.id).await?.id, request.id);
    assert_eq!(service.get_request(&org.manager, request.id).await?.id, request.id);
    assert_eq!(service.get_request(&org.officer, request.id).await?.id, request.id);

    let err = service.get_request(&org.e2, request.id).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    let err = service
        .get_request(&org.manager2, request.id)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = service
        .get_request(&org.e1, uuid::Uuid::new_v4())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    Ok(())
}

#[tokio::test]
async fn test_submit_on_behalf() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Org::create(&service).await?;

    let result = service
        .submit_request(&org.officer, leave("E1", "sick", "2024-03-01", "2024-03-01"))
        .await?;
    assert_eq!(result.request.employee_id, "E1");

    let err = service
        .submit_request(&org.e2, leave("E1", "sick", "2024-03-01", "2024-03-01"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = service
        .submit_request(&org.manager, leave("E1", "sick", "2024-03-01", "2024-03-01"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    Ok(())
}

#[tokio::test]
async fn test_authenticate() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Org::create(&service).await?;

    let actor = service.authenticate("manager", PASSWORD).await?;
    assert_eq!(actor.account_id, org.manager.account_id);
    assert_eq!(actor.employee_id, "M1");
    assert_eq!(actor.role, Role::DirectManager);

    // Usernames are case-insensitive
    let actor = service.authenticate("Manager", PASSWORD).await?;
    assert_eq!(actor.account_id, org.manager.account_id);

    let err = service.authenticate("manager", "wrong").await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));
    let err = service.authenticate("nobody", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));

    service.deactivate_account(&org.admin, "e2").await?;
    let err = service.authenticate("e2", PASSWORD).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidCredentials));
    assert_eq!(err.kind(), ErrorKind::Authorization);

    Ok(())
}

#[tokio::test]
async fn test_account_management_is_admin_only() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Org::create(&service).await?;
    service
        .add_employee(&org.admin, common::new_employee("E3", "Ezz", Some("M1")))
        .await?;

    let err = service
        .create_account(&org.officer, "e3", PASSWORD, "E3", Role::Employee)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);
    assert!(service.list_accounts(&org.officer).await.is_err());

    let err = service
        .create_account(&org.admin, "E1", PASSWORD, "E3", Role::Employee)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::UsernameTaken(_)));
    assert_eq!(err.kind(), ErrorKind::Integrity);

    let err = service
        .create_account(&org.admin, "e1-second", PASSWORD, "E1", Role::Employee)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmployeeHasAccount(_)));

    let err = service
        .create_account(&org.admin, "ghost", PASSWORD, "X9", Role::Employee)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::EmployeeNotFound(_)));

    let account = service
        .create_account(&org.admin, "e3", PASSWORD, "E3", Role::Employee)
        .await?;
    assert_eq!(account.role, Role::Employee);
    assert_eq!(service.list_accounts(&org.admin).await?.len(), 7);

    Ok(())
}

#[tokio::test]
async fn test_concurrent_account_creation_claims_username_once() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Org::create(&service).await?;
    for id in ["E3", "E4"] {
        service
            .add_employee(&org.admin, common::new_employee(id, "New Hire", Some("M1")))
            .await?;
    }

    let (first, second) = tokio::join!(
        service.create_account(&org.admin, "newhire", PASSWORD, "E3", Role::Employee),
        service.create_account(&org.admin, "NewHire", PASSWORD, "E4", Role::Employee),
    );

    assert_eq!([first.is_ok(), second.is_ok()].iter().filter(|ok| **ok).count(), 1);
    let failure = first.err().or(second.err()).unwrap();
    assert!(matches!(failure, AppError::UsernameTaken(_)));
    assert_eq!(service.list_accounts(&org.admin).await?.len(), 7);

    Ok(())
}

#[tokio::test]
async fn test_set_role() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Org::create(&service).await?;

    let promoted = service
        .set_role(&org.admin, "e1", Role::DirectManager)
        .await?;
    assert_eq!(promoted.role, Role::DirectManager);

    let actor = service.authenticate("e1", PASSWORD).await?;
    assert_eq!(actor.role, Role::DirectManager);

    let err = service
        .set_role(&org.admin, "admin", Role::Employee)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = service
        .set_role(&org.admin, "nobody", Role::Employee)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::AccountNotFound(_)));

    Ok(())
}

#[tokio::test]
async fn test_audit_log() -> Result<()> {
    let (service, _temp) = test_service().await?;
    let org = Org::create(&service).await?;

    let request = service
        .submit_request(&org.e1, leave("E1", "annual", "2024-03-01", "2024-03-02"))
        .await?
        .request;
    service
        .reject_request(&org.manager, request.id, "Audit season")
        .await?;

    let err = service
        .list_audit_log(&org.officer, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let entries = service.list_audit_log(&org.admin, Some(2)).await?;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].action, AuditAction::RequestRejected);
    assert_eq!(entries[0].actor, Some(org.manager.account_id));
    assert_eq!(entries[0].entity_id, request.id.to_string());
    assert_eq!(entries[0].details["reason"], "Audit season");
    assert_eq!(entries[1].action, AuditAction::RequestSubmitted);
    assert_eq!(entries[1].details["days_count"], 2);

    let all = service.list_audit_log(&org.admin, None).await?;
    assert!(all.iter().any(|e| e.action == AuditAction::AccountCreated));
    assert!(all.iter().any(|e| e.action == AuditAction::EmployeeAdded));

    Ok(())
}
