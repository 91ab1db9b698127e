use super::*;

fn config(base_url: &str) -> TrainingServiceConfig {
    TrainingServiceConfig {
        base_url: base_url.to_string(),
        timeout_secs: 1,
        api_key: Some("secret".to_string()),
    }
}

#[test]
fn url_joins_without_double_slashes() {
    let service = HttpTrainingService::new(&config("http://trainer:8080/api/")).unwrap();
    assert_eq!(
        service.url(&["jobs", "abc"]).as_str(),
        "http://trainer:8080/api/jobs/abc"
    );
    assert_eq!(service.url(&["jobs"]).as_str(), "http://trainer:8080/api/jobs");

    let bare = HttpTrainingService::new(&config("http://trainer:8080")).unwrap();
    assert_eq!(bare.url(&["jobs"]).as_str(), "http://trainer:8080/jobs");
}

#[test]
fn track_id_stays_one_path_segment() {
    let service = HttpTrainingService::new(&config("http://trainer:8080/api")).unwrap();
    assert_eq!(
        service.url(&["jobs", "a/../b?x=1", "result"]).as_str(),
        "http://trainer:8080/api/jobs/a%2F..%2Fb%3Fx=1/result"
    );
}

#[test]
fn invalid_base_url_is_rejected() {
    assert!(HttpTrainingService::new(&config("not a url")).is_err());
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() {
    // Port 9 (discard) on loopback is closed on test machines.
    let service = HttpTrainingService::new(&config("http://127.0.0.1:9")).unwrap();
    let err = service.status("abc").await.unwrap_err();
    assert!(
        matches!(err, ServiceError::Transport(_) | ServiceError::Timeout(_)),
        "unexpected error: {err}"
    );
}
