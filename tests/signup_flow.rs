//! End-to-end signup and rotation scenarios over the in-memory adapters.

use enlasi::auth::rotation::{self, RotationOutcome};
use enlasi::auth::token::{TokenKind, TokenProcessor};
use enlasi::auth::{AuthError, AuthService};
use enlasi::store::memory::{
    MemoryEphemeralStore, MemoryIdentityStore, MemoryMailDispatcher, MemorySecretStore,
};
use enlasi::store::qr::QrImageRenderer;
use enlasi::store::{
    auth_session_key, signup_code_key, totp_seed_path, EphemeralStore, SecretStore, SECRET_FIELD,
};
use enlasi::totp::{code as totp, uri, TotpService};
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const PNG_MAGIC: [u8; 4] = [0x89, b'P', b'N', b'G'];

fn shared_processor() -> Arc<TokenProcessor> {
    static PROCESSOR: OnceLock<Arc<TokenProcessor>> = OnceLock::new();
    PROCESSOR
        .get_or_init(|| {
            Arc::new(
                TokenProcessor::generate(
                    Duration::from_secs(900),
                    Duration::from_secs(86_400),
                    None,
                )
                .expect("key generation"),
            )
        })
        .clone()
}

struct World {
    service: AuthService,
    identities: Arc<MemoryIdentityStore>,
    sessions: Arc<MemoryEphemeralStore>,
    secrets: Arc<MemorySecretStore>,
    mailer: Arc<MemoryMailDispatcher>,
    tokens: Arc<TokenProcessor>,
}

fn world() -> World {
    let identities = Arc::new(MemoryIdentityStore::new());
    let sessions = Arc::new(MemoryEphemeralStore::new());
    let secrets = Arc::new(MemorySecretStore::new());
    let mailer = Arc::new(MemoryMailDispatcher::new());
    let tokens = shared_processor();
    let totp_service = Arc::new(TotpService::new(
        secrets.clone(),
        Arc::new(QrImageRenderer),
        "enlasi".to_string(),
    ));
    let service = AuthService::new(
        identities.clone(),
        sessions.clone(),
        secrets.clone(),
        mailer.clone(),
        totp_service,
        tokens.clone(),
        "noreply@enlasi.dev".to_string(),
    );
    World {
        service,
        identities,
        sessions,
        secrets,
        mailer,
        tokens,
    }
}

fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_secs())
}

async fn emailed_code(world: &World, email: &str) -> String {
    world
        .sessions
        .get(&signup_code_key(email))
        .await
        .expect("memory get")
        .expect("signup session present")
}

async fn current_totp_code(world: &World, email: &str) -> String {
    let fields = world
        .secrets
        .read(&totp_seed_path(email))
        .await
        .expect("memory read")
        .expect("seed stored");
    let seed_base32 = fields.get(SECRET_FIELD).expect("seed field");
    let seed = uri::decode_seed(seed_base32).expect("base32 seed");
    totp::derive_code(&seed, now_unix() / totp::STEP_SECONDS).expect("derive code")
}

#[tokio::test]
async fn full_signup_then_silent_rotation() {
    let world = world();
    let email = "a@x.com";
    let password = "pw1";

    // Stage 1: gate and dispatch.
    world.service.check(email).await.expect("check");
    let code = emailed_code(&world, email).await;
    assert_eq!(code.len(), 6);
    let (to, message) = world.mailer.sent().pop().expect("one message dispatched");
    assert_eq!(to, email);
    assert!(String::from_utf8_lossy(&message).contains(&code));

    // Stage 2: confirm creates the unverified identity.
    world
        .service
        .confirm_email(email, &code, password)
        .await
        .expect("confirm");
    let identity = world.identities.get(email).expect("identity row");
    assert!(!identity.verified);
    assert!(!identity.banned);

    // Stage 3: provisioning payload is a scannable PNG.
    let png = world.service.provision(email, password).await.expect("qr");
    assert_eq!(&png[..4], PNG_MAGIC);

    // Stage 4: a currently valid one-time code completes the signup.
    let one_time = current_totp_code(&world, email).await;
    let issued = world
        .service
        .complete(email, password, &one_time)
        .await
        .expect("complete");

    assert!(world.identities.get(email).expect("identity").verified);

    let access = world.tokens.verify(&issued.access).expect("access claims");
    let refresh = world.tokens.verify(&issued.refresh).expect("refresh claims");
    assert_eq!(access.sub, "access");
    assert_eq!(refresh.sub, "refresh");
    assert_eq!(access.user_id, email);
    assert_eq!(access.session, refresh.session);

    // Valid pair passes the rotation protocol untouched.
    let outcome = rotation::authorize(
        &world.tokens,
        world.sessions.as_ref(),
        Some(&issued.refresh),
        Some(&issued.access),
    )
    .await
    .expect("authorize");
    assert!(matches!(outcome, RotationOutcome::Authorized(_)));

    // An expired access token triggers silent renewal under a new session.
    let expired_access = world
        .tokens
        .issue_at(
            TokenKind::Access,
            email,
            &issued.session,
            i64::try_from(now_unix()).expect("clock fits") - 10_000,
        )
        .expect("expired token");
    let outcome = rotation::authorize(
        &world.tokens,
        world.sessions.as_ref(),
        Some(&issued.refresh),
        Some(&expired_access),
    )
    .await
    .expect("renewal");
    let RotationOutcome::Renewed { access_token } = outcome else {
        panic!("expected renewal");
    };
    let renewed = world.tokens.verify(&access_token).expect("renewed claims");
    assert_eq!(renewed.user_id, email);
    assert_ne!(renewed.session, issued.session);

    // The auth session record tracks only the latest id.
    let stored = world
        .sessions
        .get(&auth_session_key(email))
        .await
        .expect("memory get");
    assert_eq!(stored.as_deref(), Some(renewed.session.as_str()));
}

#[tokio::test]
async fn incorrect_password_at_complete_mutates_nothing() {
    let world = world();
    let email = "a@x.com";

    world.service.check(email).await.expect("check");
    let code = emailed_code(&world, email).await;
    world
        .service
        .confirm_email(email, &code, "pw1")
        .await
        .expect("confirm");

    let result = world.service.complete(email, "wrong", "000000").await;
    assert!(matches!(result, Err(AuthError::IncorrectCredential)));

    assert!(!world.identities.get(email).expect("identity").verified);
    assert!(!world
        .sessions
        .exists(&auth_session_key(email))
        .await
        .expect("memory exists"));
}

#[tokio::test]
async fn second_check_within_window_is_already_in_progress() {
    let world = world();

    world.service.check("b@x.com").await.expect("first check");
    let second = world.service.check("b@x.com").await;
    assert!(matches!(second, Err(AuthError::AlreadyInProgress)));

    // After the session lapses the email can start over.
    world.sessions.expire(&signup_code_key("b@x.com"));
    world.service.check("b@x.com").await.expect("fresh check");
}
