#![no_main]

use gacha_store::{
    trim_daily_records, ActiveUserMap, DailyRecordSet, ForcedMarriageCooldown, ReverseRankingStats,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);

    if let Ok(mut records) = serde_json::from_str::<DailyRecordSet>(&raw) {
        let before = records.total_records();
        let dropped = trim_daily_records(&mut records, 3);
        assert_eq!(before - dropped, records.total_records());
        assert!(records.total_records() <= 3);
        let encoded = serde_json::to_string(&records).expect("daily records re-encode");
        let decoded: DailyRecordSet = serde_json::from_str(&encoded).expect("daily records re-decode");
        assert_eq!(decoded.total_records(), records.total_records());
    }
    let _ = serde_json::from_str::<ActiveUserMap>(&raw);
    let _ = serde_json::from_str::<ForcedMarriageCooldown>(&raw);
    let _ = serde_json::from_str::<ReverseRankingStats>(&raw);
});
