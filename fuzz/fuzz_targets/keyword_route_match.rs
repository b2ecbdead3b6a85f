#![no_main]

use gacha_router::{default_keyword_router, strip_command_prefix, MatchMode};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let router = default_keyword_router();

    for mode in [MatchMode::Exact, MatchMode::StartsWith, MatchMode::Contains] {
        if let Some(route) = router.match_route(&raw, mode) {
            assert!(!route.keyword.is_empty());
            assert!(raw.contains(route.keyword.as_str()));
        }
    }
    if let Some(route) = router.match_command(&raw) {
        assert!(strip_command_prefix(&raw).starts_with(route.keyword.as_str()));
    }
});
