//! Property tests for store and mock-engine invariants.
//!
//! - The log buffer never exceeds its capacity.
//! - Consecutive equal entries collapse into one run with a repeat count;
//!   the buffer holds exactly the newest runs.
//! - Request filtering is idempotent and newest-first.
//! - Applying any query and then clearing it leaves both filtered lists
//!   exactly as they were before the query.
//! - Mock lookup returns the first active rule that matches.

use fos_devconsole::mock::find_match;
use fos_devconsole::*;
use proptest::prelude::*;

fn severity(n: u8) -> Severity {
    Severity::ALL[(n % 4) as usize]
}

/// Run-length encode `(severity, message)` pairs
fn runs(events: &[(u8, u8)]) -> Vec<((u8, u8), u32)> {
    let mut out: Vec<((u8, u8), u32)> = Vec::new();
    for &(sev, msg) in events {
        let key = (sev % 4, msg);
        match out.last_mut() {
            Some((last, count)) if *last == key => *count += 1,
            _ => out.push((key, 1)),
        }
    }
    out
}

/// Comparable view of the filtered log list
fn log_view(store: &Store) -> Vec<(Severity, String, u32)> {
    store.filtered_logs().into_iter()
        .map(|log| (log.severity, log.search_text(), log.repeat_count))
        .collect()
}

fn request_view(store: &Store) -> Vec<String> {
    store.filtered_requests().into_iter().map(|r| r.id).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn log_buffer_holds_newest_runs(
        events in prop::collection::vec((0u8..4, 0u8..3), 0..80),
        capacity in 1usize..12,
    ) {
        let store = Store::new();
        for &(sev, msg) in &events {
            let entry = LogEntry::new(severity(sev), vec![ConsoleValue::from(format!("m{}", msg))]);
            store.add_log(entry, capacity);
        }

        let expected = runs(&events);
        let expected = &expected[expected.len().saturating_sub(capacity)..];
        let state = store.state();

        prop_assert!(state.logs.len() <= capacity);
        prop_assert_eq!(state.logs.len(), expected.len());
        for (log, ((sev, msg), count)) in state.logs.iter().zip(expected) {
            prop_assert_eq!(log.severity, severity(*sev));
            prop_assert_eq!(log.args[0].to_string(), format!("m{}", msg));
            prop_assert_eq!(log.repeat_count, *count);
        }
        // Adjacent entries never repeat each other
        for pair in state.logs.iter().collect::<Vec<_>>().windows(2) {
            prop_assert!(
                pair[0].severity != pair[1].severity
                    || pair[0].args[0].to_string() != pair[1].args[0].to_string()
            );
        }
    }

    #[test]
    fn request_filter_is_idempotent(
        statuses in prop::collection::vec(prop_oneof![Just(200u16), Just(404), Just(500)], 0..20),
        query in prop_oneof![Just(""), Just("404"), Just("get"), Just("/item")],
    ) {
        let store = Store::new();
        for (i, status) in statuses.iter().enumerate() {
            let mut req = NetworkRequest::pending(
                &format!("r{}", i),
                "GET",
                Transport::Fetch,
                &format!("http://localhost/item/{}", i),
            );
            req.path = format!("/item/{}", i);
            req.status = RequestStatus::Completed(*status);
            store.add_request(req);
        }
        store.set_search_query(query);

        let first: Vec<String> = store.filtered_requests().into_iter().map(|r| r.id).collect();
        let second: Vec<String> = store.filtered_requests().into_iter().map(|r| r.id).collect();
        prop_assert_eq!(&first, &second);

        if query.is_empty() {
            let newest_first: Vec<String> = (0..statuses.len()).rev().map(|i| format!("r{}", i)).collect();
            prop_assert_eq!(first, newest_first);
        }
    }

    #[test]
    fn clearing_the_query_restores_both_lists(
        logs in prop::collection::vec((0u8..4, 0u8..4), 0..30),
        methods in prop::collection::vec(prop_oneof![Just("GET"), Just("POST")], 0..15),
        query in "[a-z0-9/ ]{0,6}",
    ) {
        const WORDS: [&str; 4] = ["Alpha", "beta ok", "GET /x", "404"];

        let store = Store::new();
        for &(sev, word) in &logs {
            store.add_log(LogEntry::new(severity(sev), vec![WORDS[word as usize].into()]), 300);
        }
        for (i, method) in methods.iter().enumerate() {
            let mut req = NetworkRequest::pending(
                &format!("r{}", i),
                method,
                Transport::Xhr,
                &format!("http://localhost/p{}", i),
            );
            req.path = format!("/p{}", i);
            store.add_request(req);
        }

        let logs_before = log_view(&store);
        let requests_before = request_view(&store);

        store.set_search_query(&query);
        let narrowed_logs = log_view(&store);
        let narrowed_requests = request_view(&store);
        prop_assert!(narrowed_logs.len() <= logs_before.len());
        prop_assert!(narrowed_requests.len() <= requests_before.len());

        store.set_search_query("");
        prop_assert_eq!(log_view(&store), logs_before);
        prop_assert_eq!(request_view(&store), requests_before);
    }

    #[test]
    fn first_active_match_wins(
        rules in prop::collection::vec((any::<bool>(), 0usize..3, 0usize..3), 0..10),
        method in 0usize..3,
        url in 0usize..3,
    ) {
        const METHODS: [&str; 3] = ["GET", "post", "*"];
        const PATTERNS: [&str; 3] = ["/api", "/api/users", "/other"];
        const URLS: [&str; 3] = ["/api/users/5", "/api", "/nothing"];
        const VERBS: [&str; 3] = ["GET", "POST", "DELETE"];

        let rules: Vec<MockRule> = rules.iter().enumerate()
            .map(|(i, (active, m, p))| {
                let rule = MockRule::new(&i.to_string(), METHODS[*m], PATTERNS[*p], 200, "{}");
                if *active { rule } else { rule.inactive() }
            })
            .collect();

        let found = find_match(&rules, VERBS[method], URLS[url]);
        let expected = rules.iter().position(|r| {
            r.active
                && (r.method == "*" || r.method.eq_ignore_ascii_case(VERBS[method]))
                && URLS[url].contains(r.url_pattern.as_str())
        });
        prop_assert_eq!(found.map(|r| r.id.clone()), expected.map(|i| i.to_string()));
    }
}
