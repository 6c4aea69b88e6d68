//! End-to-end authorization scenarios
//! These tests drive the engine the way a request guard would.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use claimgate_auth_core::{
    AuthDecision, AuthError, AuthorizationEngine, Claim, CredentialCache, Principal,
    PrincipalResolver, Result, SecurityConfig, TOKEN_TYPE_BEARER, generate_access_token,
};

fn test_config() -> SecurityConfig {
    // Do not use these settings in an application; load them from configuration.
    SecurityConfig::new(
        5000,
        "5-6QGo7FlUQ/;cAqyj]Ef0_m2K881",
        "3sDvKyg9Oy`OZ9I16nB}06N7dd",
        "EDA2AC9242B7463C8E4D28CDDF256FD9",
        5,
    )
}

fn engine() -> AuthorizationEngine {
    AuthorizationEngine::new(test_config()).unwrap()
}

fn principal(access_token: &str, expires_in: chrono::Duration, claims: Vec<Claim>) -> Principal {
    Principal {
        id: "user-1".to_string(),
        username: "alice".to_string(),
        access_token: access_token.to_string(),
        access_token_expiration: Utc::now() + expires_in,
        password_hash: String::new(),
        password_salt: String::new(),
        claims,
    }
}

fn admin_claim() -> Claim {
    Claim::new("role", "admin")
}

/// Resolver backed by at most one principal that counts its lookups
#[derive(Default)]
struct CountingResolver {
    principal: Option<Principal>,
    calls: AtomicUsize,
}

#[async_trait::async_trait]
impl PrincipalResolver for CountingResolver {
    async fn resolve(&self, access_token: &str) -> Result<Option<Principal>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .principal
            .clone()
            .filter(|p| p.access_token == access_token))
    }
}

fn header(bearer: &str) -> String {
    format!("Bearer {}", bearer)
}

#[tokio::test]
async fn test_missing_header_is_unauthenticated() {
    let engine = engine();
    let resolver = CountingResolver::default();

    let decision = engine.is_authorized(None, None, &resolver).await;

    assert_eq!(decision, AuthDecision::Unauthenticated);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_wrong_scheme_is_unauthenticated() {
    let engine = engine();
    let resolver = CountingResolver::default();

    let decision = engine.is_authorized(Some("Basic xyz"), None, &resolver).await;
    assert_eq!(decision, AuthDecision::Unauthenticated);

    // Scheme comparison is exact
    let access_token = generate_access_token();
    let bearer = engine.generate_bearer_token(&access_token).unwrap();
    let lowercase = format!("bearer {}", bearer);
    let decision = engine.is_authorized(Some(&lowercase), None, &resolver).await;
    assert_eq!(decision, AuthDecision::Unauthenticated);
}

#[tokio::test]
async fn test_forged_token_is_unauthenticated() {
    let engine = engine();
    let resolver = CountingResolver::default();
    let access_token = generate_access_token();

    // A raw access token is not a bearer token
    let decision = engine
        .is_authorized(Some(&header(&access_token)), None, &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Unauthenticated);

    // A bearer token sealed under another key is rejected
    let mut other = test_config();
    other.bearer_token_key = "a-completely-different-key".to_string();
    let foreign = AuthorizationEngine::new(other)
        .unwrap()
        .generate_bearer_token(&access_token)
        .unwrap();
    let decision = engine
        .is_authorized(Some(&header(&foreign)), None, &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Unauthenticated);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_logged_in_principal_is_authorized() {
    let engine = engine();
    let resolver = CountingResolver::default();
    let access_token = generate_access_token();
    let user = principal(&access_token, chrono::Duration::minutes(30), vec![]);

    let response = engine.login(&user).unwrap().expect("token should be issued");
    assert_eq!(response.token_type, TOKEN_TYPE_BEARER);
    assert!(response.expires_in > 29 * 60 && response.expires_in <= 30 * 60);

    let authorization = engine
        .authorize(Some(&header(&response.access_token)), None, &resolver)
        .await;
    assert_eq!(authorization.decision, AuthDecision::Authorized);
    assert_eq!(authorization.access_token.as_deref(), Some(access_token.as_str()));
    assert!(authorization.refreshed.is_none());
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_missing_claim_is_forbidden() {
    let engine = engine();
    let resolver = CountingResolver::default();
    let access_token = generate_access_token();
    let user = principal(
        &access_token,
        chrono::Duration::minutes(30),
        vec![Claim::new("role", "user")],
    );
    let response = engine.login(&user).unwrap().unwrap();

    let decision = engine
        .is_authorized(Some(&header(&response.access_token)), Some(&admin_claim()), &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Forbidden);

    // Claim matching is case-sensitive
    let decision = engine
        .is_authorized(
            Some(&header(&response.access_token)),
            Some(&Claim::new("role", "USER")),
            &resolver,
        )
        .await;
    assert_eq!(decision, AuthDecision::Forbidden);
}

#[tokio::test]
async fn test_present_claim_is_authorized() {
    let engine = engine();
    let resolver = CountingResolver::default();
    let access_token = generate_access_token();
    let user = principal(
        &access_token,
        chrono::Duration::minutes(30),
        vec![Claim::new("role", "user"), admin_claim()],
    );
    let response = engine.login(&user).unwrap().unwrap();

    let decision = engine
        .is_authorized(Some(&header(&response.access_token)), Some(&admin_claim()), &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Authorized);
    assert!(engine.has_claim(&access_token, &admin_claim()));
}

#[tokio::test]
async fn test_cache_miss_is_refilled_from_resolver() {
    let engine = engine();
    let access_token = generate_access_token();
    let resolver = CountingResolver {
        principal: Some(principal(
            &access_token,
            chrono::Duration::minutes(10),
            vec![admin_claim()],
        )),
        ..Default::default()
    };
    let bearer = engine.generate_bearer_token(&access_token).unwrap();

    let first = engine
        .authorize(Some(&header(&bearer)), Some(&admin_claim()), &resolver)
        .await;
    assert_eq!(first.decision, AuthDecision::Authorized);
    let refreshed = first.refreshed.expect("refill should mint a bearer token");
    assert_ne!(refreshed.access_token, bearer);
    assert_eq!(
        engine.access_token(Some(&header(&refreshed.access_token))),
        Some(access_token.clone())
    );

    let second = engine
        .authorize(Some(&header(&bearer)), Some(&admin_claim()), &resolver)
        .await;
    assert_eq!(second.decision, AuthDecision::Authorized);
    assert!(second.refreshed.is_none());
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.cache().count(), 1);
}

#[tokio::test]
async fn test_unknown_access_token_is_unauthenticated() {
    let engine = engine();
    let resolver = CountingResolver::default();
    let bearer = engine.generate_bearer_token(&generate_access_token()).unwrap();

    let decision = engine
        .is_authorized(Some(&header(&bearer)), None, &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Unauthenticated);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_expired_principal_from_resolver_is_unauthenticated() {
    let engine = engine();
    let access_token = generate_access_token();
    let resolver = CountingResolver {
        principal: Some(principal(
            &access_token,
            chrono::Duration::minutes(-1),
            vec![admin_claim()],
        )),
        ..Default::default()
    };
    let bearer = engine.generate_bearer_token(&access_token).unwrap();

    let decision = engine
        .is_authorized(Some(&header(&bearer)), None, &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Unauthenticated);
    assert_eq!(engine.cache().count(), 0);
}

#[tokio::test]
async fn test_expired_cached_credentials_fall_back_to_resolver() {
    let engine = engine();
    let access_token = generate_access_token();
    let user = principal(&access_token, chrono::Duration::seconds(2), vec![]);
    let response = engine.login(&user).unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(2100)).await;

    let resolver = CountingResolver::default();
    let decision = engine
        .is_authorized(Some(&header(&response.access_token)), None, &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Unauthenticated);
    assert_eq!(resolver.calls.load(Ordering::SeqCst), 1);
    assert_eq!(engine.cache().count(), 0);
}

#[tokio::test]
async fn test_resolver_for_other_token_is_unauthenticated() {
    let engine = engine();
    let access_token = generate_access_token();
    let resolver = move |_token: String| async move {
        Ok::<_, AuthError>(Some(principal(
            "someone-else",
            chrono::Duration::minutes(10),
            vec![],
        )))
    };
    let bearer = engine.generate_bearer_token(&access_token).unwrap();

    let decision = engine
        .is_authorized(Some(&header(&bearer)), None, &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Unauthenticated);
}

#[tokio::test]
async fn test_resolver_error_is_unauthenticated() {
    let engine = engine();
    let resolver = |_token: String| async {
        Err::<Option<Principal>, _>(AuthError::ProviderError("database offline".to_string()))
    };
    let bearer = engine.generate_bearer_token(&generate_access_token()).unwrap();

    let decision = engine
        .is_authorized(Some(&header(&bearer)), Some(&admin_claim()), &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Unauthenticated);
}

#[tokio::test]
async fn test_resolver_timeout_is_unauthenticated() {
    let config = test_config().with_resolver_timeout(Duration::from_millis(50));
    let engine = AuthorizationEngine::new(config).unwrap();
    let access_token = generate_access_token();
    let slow_user = principal(&access_token, chrono::Duration::minutes(10), vec![]);
    let resolver = move |_token: String| {
        let user = slow_user.clone();
        async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, AuthError>(Some(user))
        }
    };
    let bearer = engine.generate_bearer_token(&access_token).unwrap();

    let decision = engine
        .is_authorized(Some(&header(&bearer)), None, &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Unauthenticated);
    assert_eq!(engine.cache().count(), 0);
}

#[tokio::test]
async fn test_logout_evicts_credentials() {
    let engine = engine();
    let resolver = CountingResolver::default();
    let access_token = generate_access_token();
    let user = principal(&access_token, chrono::Duration::minutes(30), vec![]);
    let response = engine.login(&user).unwrap().unwrap();

    engine.logout(&access_token);

    let decision = engine
        .is_authorized(Some(&header(&response.access_token)), None, &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Unauthenticated);
    assert_eq!(engine.cache().count(), 0);
}

#[tokio::test]
async fn test_relogin_replaces_cached_claims() {
    let engine = engine();
    let access_token = generate_access_token();
    let mut user = principal(&access_token, chrono::Duration::minutes(30), vec![]);
    engine.login(&user).unwrap().unwrap();
    assert!(!engine.has_claim(&access_token, &admin_claim()));

    user.claims.push(admin_claim());
    engine.login(&user).unwrap().unwrap();

    assert!(engine.has_claim(&access_token, &admin_claim()));
    assert_eq!(engine.cache().count(), 1);
}

#[tokio::test]
async fn test_update_claims() {
    let engine = engine();
    let access_token = generate_access_token();
    let mut user = principal(&access_token, chrono::Duration::minutes(30), vec![]);

    assert!(!engine.update_claims(&user));

    engine.login(&user).unwrap().unwrap();
    user.claims.push(admin_claim());
    assert!(engine.update_claims(&user));
    assert!(engine.has_claim(&access_token, &admin_claim()));
}

#[tokio::test]
async fn test_update_claims_after_logout_caches_nothing() {
    let engine = engine();
    let resolver = CountingResolver::default();
    let access_token = generate_access_token();
    let mut user = principal(&access_token, chrono::Duration::minutes(30), vec![]);
    let response = engine.login(&user).unwrap().unwrap();

    engine.logout(&access_token);
    user.claims.push(admin_claim());
    assert!(!engine.update_claims(&user));
    assert_eq!(engine.cache().count(), 0);

    let decision = engine
        .is_authorized(Some(&header(&response.access_token)), None, &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Unauthenticated);
}

#[tokio::test]
async fn test_login_with_sub_second_lifetime() {
    let engine = engine();
    let access_token = generate_access_token();
    let user = principal(&access_token, chrono::Duration::milliseconds(900), vec![]);

    let response = engine.login(&user).unwrap().expect("token is still valid");
    assert_eq!(response.expires_in, 0);
    assert!(engine.valid_access_token(&access_token, &CountingResolver::default()).await);
}

#[tokio::test]
async fn test_out_of_range_cache_duration_refuses_start() {
    let mut config = test_config();
    config.access_token_cache_duration = u64::MAX / 60;
    assert!(matches!(
        AuthorizationEngine::new(config),
        Err(AuthError::ConfigError(_))
    ));
}

#[tokio::test]
async fn test_engines_with_separate_caches_are_isolated() {
    let first = engine();
    let second = engine();
    let access_token = generate_access_token();
    let response = first
        .login(&principal(&access_token, chrono::Duration::minutes(30), vec![]))
        .unwrap()
        .unwrap();

    let resolver = CountingResolver::default();
    let decision = second
        .is_authorized(Some(&header(&response.access_token)), None, &resolver)
        .await;
    assert_eq!(decision, AuthDecision::Unauthenticated);
}

#[tokio::test]
async fn test_shared_cache_handle() {
    let cache = CredentialCache::new();
    let first = AuthorizationEngine::with_cache(test_config(), cache.clone()).unwrap();
    let second = AuthorizationEngine::with_cache(test_config(), cache.clone()).unwrap();
    let access_token = generate_access_token();
    first
        .login(&principal(&access_token, chrono::Duration::minutes(30), vec![]))
        .unwrap()
        .unwrap();

    let resolver = CountingResolver::default();
    assert!(second.valid_access_token(&access_token, &resolver).await);
    assert_eq!(cache.count(), 1);
}

#[tokio::test]
async fn test_concurrent_requests_share_one_engine() {
    let engine = Arc::new(engine());
    let access_token = generate_access_token();
    let response = engine
        .login(&principal(
            &access_token,
            chrono::Duration::minutes(30),
            vec![admin_claim()],
        ))
        .unwrap()
        .unwrap();
    let authorization = header(&response.access_token);

    let tasks: Vec<_> = (0..32)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let authorization = authorization.clone();
            tokio::spawn(async move {
                let resolver = CountingResolver::default();
                engine
                    .is_authorized(Some(&authorization), Some(&admin_claim()), &resolver)
                    .await
            })
        })
        .collect();

    for task in tasks {
        assert_eq!(task.await.unwrap(), AuthDecision::Authorized);
    }
}

#[test]
fn test_weak_configuration_refuses_to_start() {
    let mut config = test_config();
    config.bearer_token_key = "short".to_string();
    assert!(matches!(
        AuthorizationEngine::new(config),
        Err(AuthError::ConfigError(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_mitigate_brute_force_is_bounded() {
    let config = test_config().with_brute_force_max_delay(Duration::from_secs(5));
    let engine = AuthorizationEngine::new(config).unwrap();

    let started = tokio::time::Instant::now();
    engine.mitigate_brute_force().await;
    assert!(started.elapsed() < Duration::from_secs(5));
}
