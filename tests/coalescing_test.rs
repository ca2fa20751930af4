use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mdm_mcp::prelude::*;

mod support;
use support::{IAM_PATH, SCENARIO_CRN, cloud_config, hub_config, iam_body, manager};

#[tokio::test]
async fn concurrent_callers_share_a_single_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IAM_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(iam_body("shared-token", 3600))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let auth = Arc::new(manager(cloud_config(&server.uri(), SCENARIO_CRN)));
    let tasks = (0..32).map(|_| {
        let auth = Arc::clone(&auth);
        tokio::spawn(async move { auth.authorization_header().await })
    });

    for result in join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap(), "Bearer shared-token");
    }
    assert!(!auth.cache().is_refreshing(auth.cache_key()));
}

#[tokio::test]
async fn concurrent_callers_share_a_single_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(support::AUTHORIZE_PATH))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_string("bad credentials")
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let auth = Arc::new(manager(hub_config(&server.uri(), "wrong")));
    let tasks = (0..16).map(|_| {
        let auth = Arc::clone(&auth);
        tokio::spawn(async move { auth.token().await })
    });

    let errors: Vec<AuthError> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap_err())
        .collect();
    assert_eq!(errors.len(), 16);
    assert!(errors.windows(2).all(|pair| pair[0] == pair[1]));
    assert_eq!(errors[0].status_code(), Some(401));
}

#[tokio::test]
async fn cancelled_caller_does_not_abort_the_refresh() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IAM_PATH))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(iam_body("survivor", 3600))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(1)
        .mount(&server)
        .await;

    let auth = Arc::new(manager(cloud_config(&server.uri(), SCENARIO_CRN)));
    let caller = {
        let auth = Arc::clone(&auth);
        tokio::spawn(async move { auth.token().await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    caller.abort();

    // A later caller joins the surviving round instead of starting another.
    assert_eq!(auth.token().await.unwrap().value, "survivor");
}

#[tokio::test]
async fn shared_cache_spans_managers_for_the_same_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(IAM_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(iam_body("one", 3600)))
        .expect(1)
        .mount(&server)
        .await;

    let first_config = cloud_config(&server.uri(), SCENARIO_CRN);
    let cache = Arc::new(first_config.token_cache());
    let first = AuthenticationManager::from_config(first_config, Arc::clone(&cache)).unwrap();
    let second = AuthenticationManager::from_config(
        cloud_config(&server.uri(), SCENARIO_CRN),
        Arc::clone(&cache),
    )
    .unwrap();

    first.token().await.unwrap();
    assert_eq!(second.token().await.unwrap().value, "one");
}
