// libs/appointment-cell/tests/booking_test.rs
//
// Orchestrator tests against a mocked data store: booking, the commit-time
// race re-check, policy cutoffs, and cancellation paths.

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};
use uuid::Uuid;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appointment_cell::models::{
    AppointmentError, AppointmentStatus, BookAppointmentRequest, UpdateAppointmentRequest,
};
use appointment_cell::services::AppointmentBookingService;
use shared_database::StoreClient;
use shared_models::auth::User;
use shared_utils::test_utils::{TestConfig, TestUser};

const AUTH_TOKEN: &str = "test-token";

struct TestSetup {
    service: AppointmentBookingService,
    mock_server: MockServer,
}

impl TestSetup {
    async fn new() -> Self {
        let mock_server = MockServer::start().await;
        let config = TestConfig::with_store_url(&mock_server.uri()).to_app_config();
        let store = Arc::new(StoreClient::new(&config));

        Self {
            service: AppointmentBookingService::with_store(store),
            mock_server,
        }
    }

    async fn mount_audit_sink(&self) {
        Mock::given(method("POST"))
            .and(path("/rest/v1/audit_logs"))
            .respond_with(ResponseTemplate::new(201).set_body_json(Vec::<Value>::new()))
            .mount(&self.mock_server)
            .await;
    }

    async fn mount_default_policy(&self) {
        Mock::given(method("GET"))
            .and(path("/rest/v1/clinic_policies"))
            .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Value>::new()))
            .mount(&self.mock_server)
            .await;
    }
}

fn patient() -> (TestUser, User) {
    let test_user = TestUser::patient("patient@clinico.test");
    let user = test_user.to_user();
    (test_user, user)
}

fn appointment_row(
    id: Uuid,
    patient_id: &str,
    provider_id: Uuid,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    status: &str,
) -> Value {
    json!({
        "id": id,
        "patient_id": patient_id,
        "provider_id": provider_id,
        "appointment_type_id": null,
        "title": "Checkup",
        "description": null,
        "start_time": start.to_rfc3339(),
        "end_time": end.to_rfc3339(),
        "status": status,
        "clinical_notes": null,
        "notes": null,
        "intake_forms": null,
        "created_at": "2029-01-01T00:00:00Z",
        "updated_at": "2029-01-01T00:00:00Z"
    })
}

fn book_request(provider_id: Uuid, start: DateTime<Utc>, end: DateTime<Utc>) -> BookAppointmentRequest {
    BookAppointmentRequest {
        title: "Checkup".to_string(),
        description: None,
        start_time: start,
        end_time: end,
        provider_id: Some(provider_id),
        patient_id: None,
        appointment_type_id: None,
    }
}

// ==============================================================================
// BOOKING
// ==============================================================================

#[tokio::test]
async fn booking_a_free_slot_succeeds() {
    let setup = TestSetup::new().await;
    let (test_user, user) = patient();
    let provider_id = Uuid::new_v4();
    let appointment_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(7);
    let end = start + Duration::minutes(30);

    // Both conflict checks (pre-insert and post-insert) see no overlap.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Value>::new()))
        .mount(&setup.mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![appointment_row(
            appointment_id,
            &test_user.id,
            provider_id,
            start,
            end,
            "SCHEDULED",
        )]))
        .expect(1)
        .mount(&setup.mock_server)
        .await;
    setup.mount_audit_sink().await;

    let appointment = setup
        .service
        .book_appointment(book_request(provider_id, start, end), &user, AUTH_TOKEN)
        .await
        .expect("booking should succeed");

    assert_eq!(appointment.id, appointment_id);
    assert_eq!(appointment.status, AppointmentStatus::Scheduled);
    assert_eq!(appointment.provider_id, provider_id);
}

#[tokio::test]
async fn booking_an_occupied_slot_fails_without_insert() {
    let setup = TestSetup::new().await;
    let (_, user) = patient();
    let provider_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(7);
    let end = start + Duration::minutes(30);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            Uuid::new_v4(),
            &Uuid::new_v4().to_string(),
            provider_id,
            start,
            end,
            "SCHEDULED",
        )]))
        .mount(&setup.mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(Vec::<Value>::new()))
        .expect(0)
        .mount(&setup.mock_server)
        .await;

    let result = setup
        .service
        .book_appointment(book_request(provider_id, start, end), &user, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotUnavailable));
}

#[tokio::test]
async fn losing_the_commit_race_compensates_and_surfaces_slot_unavailable() {
    let setup = TestSetup::new().await;
    let (test_user, user) = patient();
    let provider_id = Uuid::new_v4();
    let own_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(7);
    let end = start + Duration::minutes(30);

    // First conflict check: clear. Mounted first and limited to one match so
    // the post-insert re-check falls through to the next mock.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Value>::new()))
        .up_to_n_times(1)
        .mount(&setup.mock_server)
        .await;
    // Re-check: a concurrent booking won the slot.
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            Uuid::new_v4(),
            &Uuid::new_v4().to_string(),
            provider_id,
            start,
            end,
            "SCHEDULED",
        )]))
        .mount(&setup.mock_server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(vec![appointment_row(
            own_id,
            &test_user.id,
            provider_id,
            start,
            end,
            "SCHEDULED",
        )]))
        .expect(1)
        .mount(&setup.mock_server)
        .await;
    // Compensation: our own row is cancelled.
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            own_id,
            &test_user.id,
            provider_id,
            start,
            end,
            "CANCELLED",
        )]))
        .expect(1)
        .mount(&setup.mock_server)
        .await;

    let result = setup
        .service
        .book_appointment(book_request(provider_id, start, end), &user, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotUnavailable));
}

#[tokio::test]
async fn inverted_time_range_is_rejected() {
    let setup = TestSetup::new().await;
    let (_, user) = patient();
    let provider_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(7);

    let result = setup
        .service
        .book_appointment(
            book_request(provider_id, start, start - Duration::minutes(30)),
            &user,
            AUTH_TOKEN,
        )
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidInput(_)));
}

// ==============================================================================
// POLICY CUTOFFS
// ==============================================================================

#[tokio::test]
async fn patient_cancellation_inside_cutoff_is_denied_with_default_policy() {
    let setup = TestSetup::new().await;
    let (test_user, user) = patient();
    let appointment_id = Uuid::new_v4();
    // Two hours out: far inside the default 24h cancellation cutoff.
    let start = Utc::now() + Duration::hours(2);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &test_user.id,
            Uuid::new_v4(),
            start,
            start + Duration::minutes(30),
            "SCHEDULED",
        )]))
        .mount(&setup.mock_server)
        .await;
    setup.mount_default_policy().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Value>::new()))
        .expect(0)
        .mount(&setup.mock_server)
        .await;

    let result = setup
        .service
        .cancel_appointment(appointment_id, &user, AUTH_TOKEN)
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::PolicyCutoffViolation { cutoff_hours: 24 })
    );
}

#[tokio::test]
async fn patient_reschedule_inside_cutoff_reports_configured_hours() {
    let setup = TestSetup::new().await;
    let (test_user, user) = patient();
    let appointment_id = Uuid::new_v4();
    let start = Utc::now() + Duration::hours(2);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &test_user.id,
            Uuid::new_v4(),
            start,
            start + Duration::minutes(30),
            "SCHEDULED",
        )]))
        .mount(&setup.mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/clinic_policies"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![json!({
            "id": "default",
            "cancellation_cutoff_hours": 24,
            "reschedule_cutoff_hours": 12,
            "office_hours_start": "09:00:00",
            "office_hours_end": "17:00:00"
        })]))
        .mount(&setup.mock_server)
        .await;

    let request = UpdateAppointmentRequest {
        start_time: Some(start + Duration::days(3)),
        end_time: Some(start + Duration::days(3) + Duration::minutes(30)),
        ..Default::default()
    };

    let result = setup
        .service
        .update_appointment(appointment_id, request, &user, AUTH_TOKEN)
        .await;

    assert_matches!(
        result,
        Err(AppointmentError::PolicyCutoffViolation { cutoff_hours: 12 })
    );
}

#[tokio::test]
async fn provider_cancellation_bypasses_the_cutoff() {
    let setup = TestSetup::new().await;
    let provider = TestUser::provider("doc@clinico.test");
    let user = provider.to_user();
    let provider_id = Uuid::parse_str(&provider.id).unwrap();
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4().to_string();
    let start = Utc::now() + Duration::hours(2);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &patient_id,
            provider_id,
            start,
            start + Duration::minutes(30),
            "SCHEDULED",
        )]))
        .mount(&setup.mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &patient_id,
            provider_id,
            start,
            start + Duration::minutes(30),
            "CANCELLED",
        )]))
        .expect(1)
        .mount(&setup.mock_server)
        .await;
    setup.mount_audit_sink().await;

    let cancelled = setup
        .service
        .cancel_appointment(appointment_id, &user, AUTH_TOKEN)
        .await
        .expect("provider cancellation should succeed");

    assert_eq!(cancelled.status, AppointmentStatus::Cancelled);
}

// ==============================================================================
// RESCHEDULE
// ==============================================================================

#[tokio::test]
async fn reschedule_into_an_occupied_range_fails() {
    let setup = TestSetup::new().await;
    let (test_user, user) = patient();
    let appointment_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();
    // Far outside the cutoff so the policy allows the attempt.
    let start = Utc::now() + Duration::days(10);
    let new_start = start + Duration::hours(3);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &test_user.id,
            provider_id,
            start,
            start + Duration::minutes(30),
            "SCHEDULED",
        )]))
        .mount(&setup.mock_server)
        .await;
    setup.mount_default_policy().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            Uuid::new_v4(),
            &Uuid::new_v4().to_string(),
            provider_id,
            new_start,
            new_start + Duration::minutes(30),
            "SCHEDULED",
        )]))
        .mount(&setup.mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Value>::new()))
        .expect(0)
        .mount(&setup.mock_server)
        .await;

    let request = UpdateAppointmentRequest {
        start_time: Some(new_start),
        end_time: Some(new_start + Duration::minutes(30)),
        ..Default::default()
    };

    let result = setup
        .service
        .update_appointment(appointment_id, request, &user, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::SlotUnavailable));
}

#[tokio::test]
async fn reschedule_outside_cutoff_commits_new_times() {
    let setup = TestSetup::new().await;
    let (test_user, user) = patient();
    let appointment_id = Uuid::new_v4();
    let provider_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(10);
    let new_start = start + Duration::hours(3);
    let new_end = new_start + Duration::minutes(30);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", appointment_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &test_user.id,
            provider_id,
            start,
            start + Duration::minutes(30),
            "SCHEDULED",
        )]))
        .mount(&setup.mock_server)
        .await;
    setup.mount_default_policy().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", format!("eq.{}", provider_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Value>::new()))
        .mount(&setup.mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &test_user.id,
            provider_id,
            new_start,
            new_end,
            "SCHEDULED",
        )]))
        .expect(1)
        .mount(&setup.mock_server)
        .await;
    setup.mount_audit_sink().await;

    let request = UpdateAppointmentRequest {
        start_time: Some(new_start),
        end_time: Some(new_end),
        ..Default::default()
    };

    let updated = setup
        .service
        .update_appointment(appointment_id, request, &user, AUTH_TOKEN)
        .await
        .expect("reschedule should succeed");

    // Status survives a reschedule unchanged.
    assert_eq!(updated.status, AppointmentStatus::Scheduled);
    assert_eq!(updated.start_time, new_start);
    assert_eq!(updated.end_time, new_end);
}

// ==============================================================================
// VISIBILITY AND LIFECYCLE
// ==============================================================================

#[tokio::test]
async fn unknown_appointment_is_not_found() {
    let setup = TestSetup::new().await;
    let (_, user) = patient();
    let appointment_id = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(Vec::<Value>::new()))
        .mount(&setup.mock_server)
        .await;

    let result = setup
        .service
        .get_appointment(appointment_id, &user, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::NotFound));
}

#[tokio::test]
async fn appointments_of_other_patients_are_invisible() {
    let setup = TestSetup::new().await;
    let (_, user) = patient();
    let appointment_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(3);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &Uuid::new_v4().to_string(),
            Uuid::new_v4(),
            start,
            start + Duration::minutes(30),
            "SCHEDULED",
        )]))
        .mount(&setup.mock_server)
        .await;

    let result = setup
        .service
        .get_appointment(appointment_id, &user, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::NotFound));
}

#[tokio::test]
async fn cancelled_appointment_cannot_be_cancelled_again() {
    let setup = TestSetup::new().await;
    let (test_user, user) = patient();
    let appointment_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(3);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &test_user.id,
            Uuid::new_v4(),
            start,
            start + Duration::minutes(30),
            "CANCELLED",
        )]))
        .mount(&setup.mock_server)
        .await;

    let result = setup
        .service
        .cancel_appointment(appointment_id, &user, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::InvalidStatusTransition(_)));
}

#[tokio::test]
async fn patient_cannot_mark_completed() {
    let setup = TestSetup::new().await;
    let (test_user, user) = patient();
    let appointment_id = Uuid::new_v4();
    let start = Utc::now() + Duration::days(3);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &test_user.id,
            Uuid::new_v4(),
            start,
            start + Duration::minutes(30),
            "SCHEDULED",
        )]))
        .mount(&setup.mock_server)
        .await;

    let request = UpdateAppointmentRequest {
        status: Some(AppointmentStatus::Completed),
        ..Default::default()
    };

    let result = setup
        .service
        .update_appointment(appointment_id, request, &user, AUTH_TOKEN)
        .await;

    assert_matches!(result, Err(AppointmentError::Unauthorized(_)));
}

#[tokio::test]
async fn provider_marks_no_show() {
    let setup = TestSetup::new().await;
    let provider = TestUser::provider("doc@clinico.test");
    let user = provider.to_user();
    let provider_id = Uuid::parse_str(&provider.id).unwrap();
    let appointment_id = Uuid::new_v4();
    let patient_id = Uuid::new_v4().to_string();
    let start = Utc::now() - Duration::hours(1);

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &patient_id,
            provider_id,
            start,
            start + Duration::minutes(30),
            "SCHEDULED",
        )]))
        .mount(&setup.mock_server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(vec![appointment_row(
            appointment_id,
            &patient_id,
            provider_id,
            start,
            start + Duration::minutes(30),
            "NO_SHOW",
        )]))
        .expect(1)
        .mount(&setup.mock_server)
        .await;
    setup.mount_audit_sink().await;

    let request = UpdateAppointmentRequest {
        status: Some(AppointmentStatus::NoShow),
        ..Default::default()
    };

    let updated = setup
        .service
        .update_appointment(appointment_id, request, &user, AUTH_TOKEN)
        .await
        .expect("no-show transition should succeed");

    assert_eq!(updated.status, AppointmentStatus::NoShow);
}
