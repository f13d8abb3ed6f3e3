use amplihack_memory::{
    Experience, ExperienceStore, MemoryConnector, NewExperience, QueryBuilder,
};
use rusqlite::params_from_iter;
use tempfile::{TempDir, tempdir};

fn seeded() -> (MemoryConnector, TempDir) {
    let tmp = tempdir().expect("tempdir");
    let connector = MemoryConnector::open(tmp.path().join("memory.db")).expect("open");
    {
        let store = ExperienceStore::new(&connector);
        let rows = [
            ("a", "listed 100% of files today", 3, vec!["fs"]),
            ("a", "compiled the project", 9, vec!["build"]),
            ("a", "listed files_backup", 7, vec!["fs", "backup"]),
            ("b", "listed files for b", 10, vec!["fs"]),
        ];
        for (agent, context, importance, tags) in rows {
            store
                .store(
                    NewExperience::new(agent, context, "act", "done")
                        .importance(importance)
                        .tags(tags),
                )
                .expect("seed");
        }
    }
    (connector, tmp)
}

#[test]
fn recent_by_tag_is_scoped_and_newest_first() {
    let (connector, _tmp) = seeded();
    let got = connector
        .query_experiences(&QueryBuilder::recent_by_tag("a", "fs", 10))
        .unwrap();
    let contexts: Vec<&str> = got.iter().map(|e| e.context.as_str()).collect();
    assert_eq!(contexts, vec!["listed files_backup", "listed 100% of files today"]);
}

#[test]
fn high_importance_orders_by_importance() {
    let (connector, _tmp) = seeded();
    let got = connector
        .query_experiences(&QueryBuilder::high_importance("a", 7, 10))
        .unwrap();
    let importances: Vec<u8> = got.iter().map(|e| e.importance).collect();
    assert_eq!(importances, vec![9, 7]);

    let got = connector
        .query_experiences(&QueryBuilder::high_importance("a", 1, 1))
        .unwrap();
    assert_eq!(got.len(), 1);
}

#[test]
fn context_keyword_treats_wildcards_literally() {
    let (connector, _tmp) = seeded();

    let got = connector
        .query_experiences(&QueryBuilder::context_keyword("a", "100%", 10))
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].context, "listed 100% of files today");

    // "_" must not match the space in "listed 100% of files today"
    let got = connector
        .query_experiences(&QueryBuilder::context_keyword("a", "files_", 10))
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].context, "listed files_backup");

    let got = connector
        .query_experiences(&QueryBuilder::context_keyword("a", "LISTED", 10))
        .unwrap();
    assert_eq!(got.len(), 2);
}

#[test]
fn built_queries_run_on_a_raw_connection() {
    let (connector, _tmp) = seeded();
    let q = QueryBuilder::recent_by_tag("b", "fs", 5);
    let conn = connector.connection().expect("connected");

    let mut stmt = conn.prepare(&q.sql).unwrap();
    let got: Vec<Experience> = stmt
        .query_map(params_from_iter(q.params.iter()), Experience::from_row)
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(got.len(), 1);
    assert_eq!(got[0].agent_id, "b");
}
