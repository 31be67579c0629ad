use criterion::{Criterion, criterion_group, criterion_main};
use music_mcp_server::oauth2::{
    clients::{ClientMetadata, ClientRegistry},
    codes::{AuthorizationCodes, CodeGrant},
    pkce,
    tokens::Tokens,
};
use std::hint::black_box;
use time::Duration;

// CI-friendly benchmark configuration
fn is_ci_mode() -> bool {
    std::env::var("CI").is_ok() || std::env::var("QUICK_BENCH").is_ok()
}

fn benchmark_pkce(c: &mut Criterion) {
    c.bench_function("pkce_generate", |b| {
        b.iter(|| black_box(pkce::generate()));
    });

    c.bench_function("pkce_verify_s256", |b| {
        let pair = pkce::generate();
        b.iter(|| {
            black_box(pkce::verify_s256(
                black_box(&pair.code_verifier),
                black_box(&pair.code_challenge),
            ))
        });
    });
}

fn benchmark_code_lifecycle(c: &mut Criterion) {
    let codes = AuthorizationCodes::in_memory(Duration::minutes(10));
    let pair = pkce::generate();

    c.bench_function("authorization_code_issue_redeem", |b| {
        b.iter(|| {
            let code = codes.issue(CodeGrant {
                client_id: "mcp_bench".to_string(),
                redirect_uri: "https://client.example/cb".to_string(),
                scope: "mcp:tools".to_string(),
                code_challenge: pair.code_challenge.clone(),
                user_id: "user_mcp_bench".to_string(),
            });
            let record = codes.redeem(&code, "mcp_bench", None, &pair.code_verifier);
            black_box(record.is_ok());
        });
    });
}

fn benchmark_tokens(c: &mut Criterion) {
    let tokens = Tokens::in_memory(Duration::hours(1));

    c.bench_function("access_token_issue", |b| {
        b.iter(|| {
            black_box(tokens.issue("mcp_bench", "user_mcp_bench", "mcp:tools", None));
        });
    });

    c.bench_function("access_token_validate", |b| {
        let issued = tokens.issue("mcp_bench", "user_mcp_bench", "mcp:tools", None);
        b.iter(|| black_box(tokens.validate(black_box(&issued.token))));
    });
}

fn benchmark_client_registration(c: &mut Criterion) {
    let mut group = c.benchmark_group("client_registration");
    if is_ci_mode() {
        group.sample_size(10);
    }
    let registry = ClientRegistry::in_memory("mcp:tools");

    group.bench_function("register", |b| {
        b.iter(|| {
            let client = registry.register(ClientMetadata {
                client_name: Some("Bench Client".to_string()),
                redirect_uris: vec!["https://client.example/cb".to_string()],
                ..ClientMetadata::default()
            });
            black_box(client.is_ok());
        });
    });

    let client = registry
        .register(ClientMetadata {
            redirect_uris: vec!["https://client.example/cb".to_string()],
            ..ClientMetadata::default()
        })
        .unwrap();
    group.bench_function("authenticate", |b| {
        b.iter(|| {
            black_box(
                registry
                    .authenticate(&client.client_id, Some(&client.client_secret))
                    .is_ok(),
            )
        });
    });
    group.finish();
}

criterion_group!(
    benches,
    benchmark_pkce,
    benchmark_code_lifecycle,
    benchmark_tokens,
    benchmark_client_registration
);
criterion_main!(benches);
