//! Chapter Service Integration Tests
//!
//! End-to-end moves, reorders and deletes against a real libsql database.
//! A rejected edit must leave the stored hierarchy untouched and emit no
//! events; a committed edit must emit exactly the matching events.

#[cfg(test)]
mod chapter_service_tests {
    use anyhow::Result;
    use folio_core::db::{ChapterStore, DomainEvent, LibsqlChapterStore};
    use folio_core::hierarchy::{
        check_invariants, HierarchyConfig, HierarchyError, OrphanPolicy,
    };
    use folio_core::models::{
        Book, Chapter, ChapterContentUpdate, ChapterPosition, CreateChapterParams, CurrentUser,
    };
    use folio_core::services::{ChapterService, ChapterServiceError, MoveRequest};
    use std::sync::Arc;
    use tempfile::TempDir;
    use tokio::time::{timeout, Duration};

    struct Fixture {
        service: ChapterService,
        store: Arc<LibsqlChapterStore>,
        user: CurrentUser,
        book: Book,
        _temp_dir: TempDir,
    }

    async fn setup(config: HierarchyConfig, policy: OrphanPolicy) -> Result<Fixture> {
        let temp_dir = TempDir::new()?;
        let store = Arc::new(LibsqlChapterStore::open(temp_dir.path().join("test.db")).await?);
        let service = ChapterService::new(store.clone())
            .with_hierarchy(config)
            .with_orphan_policy(policy);
        let user = CurrentUser::new("alice");
        let book = service
            .create_book(&user, "Field Guide", Some("Alice".to_string()))
            .await?;
        Ok(Fixture {
            service,
            store,
            user,
            book,
            _temp_dir: temp_dir,
        })
    }

    async fn add(f: &Fixture, id: &str, parent: Option<&str>) -> Result<Chapter> {
        Ok(f.service
            .create_chapter(
                &f.user,
                &f.book.id,
                CreateChapterParams {
                    id: Some(id.to_string()),
                    title: format!("Chapter {}", id),
                    content: String::new(),
                    parent_id: parent.map(str::to_string),
                },
            )
            .await?)
    }

    /// Stored chapters as `(id, parent, order, level)`, sorted by id
    async fn stored(f: &Fixture) -> Result<Vec<(String, Option<String>, u32, u32)>> {
        let mut rows: Vec<_> = f
            .store
            .load_all(&f.book.id)
            .await?
            .chapters
            .into_iter()
            .map(|c| (c.id, c.parent_id, c.order, c.level))
            .collect();
        rows.sort();
        Ok(rows)
    }

    fn row(id: &str, parent: Option<&str>, order: u32, level: u32) -> (String, Option<String>, u32, u32) {
        (id.to_string(), parent.map(str::to_string), order, level)
    }

    async fn assert_invariants(f: &Fixture) -> Result<()> {
        let snapshot = f.store.load_all(&f.book.id).await?;
        check_invariants(&snapshot.chapters, f.service.hierarchy())?;
        Ok(())
    }

    #[tokio::test]
    async fn test_move_to_front_renumbers_siblings() -> Result<()> {
        let f = setup(HierarchyConfig::default(), OrphanPolicy::default()).await?;
        for id in ["a", "b", "c"] {
            add(&f, id, None).await?;
        }

        let chapters = f
            .service
            .move_chapter(&f.user, &f.book.id, &MoveRequest::new("c", None, 0))
            .await?;

        let ids: Vec<_> = chapters.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        assert_eq!(
            stored(&f).await?,
            vec![row("a", None, 1, 0), row("b", None, 2, 0), row("c", None, 0, 0)]
        );
        assert_invariants(&f).await
    }

    #[tokio::test]
    async fn test_reparent_to_root_cascades_levels() -> Result<()> {
        let f = setup(HierarchyConfig::default(), OrphanPolicy::default()).await?;
        add(&f, "root", None).await?;
        add(&f, "x", Some("root")).await?;
        add(&f, "y", Some("x")).await?;
        add(&f, "z", Some("y")).await?;

        f.service
            .move_chapter(&f.user, &f.book.id, &MoveRequest::new("x", None, 99))
            .await?;

        assert_eq!(
            stored(&f).await?,
            vec![
                row("root", None, 0, 0),
                row("x", None, 1, 0),
                row("y", Some("x"), 0, 1),
                row("z", Some("y"), 0, 2),
            ]
        );
        assert_invariants(&f).await
    }

    #[tokio::test]
    async fn test_depth_violation_is_rejected_and_state_kept() -> Result<()> {
        let f = setup(HierarchyConfig::with_max_depth(3), OrphanPolicy::default()).await?;
        add(&f, "a", None).await?;
        add(&f, "a1", Some("a")).await?;
        add(&f, "a2", Some("a1")).await?;
        add(&f, "b", None).await?;
        let before = stored(&f).await?;

        let mut rx = f.service.subscribe();
        let err = f
            .service
            .move_chapter(&f.user, &f.book.id, &MoveRequest::new("b", Some("a2".into()), 0))
            .await
            .unwrap_err();

        assert!(err.is_rejection());
        assert!(matches!(
            err,
            ChapterServiceError::Rejected(HierarchyError::DepthExceeded { level: 3, max_depth: 3, .. })
        ));
        assert_eq!(stored(&f).await?, before);
        assert!(rx.try_recv().is_err(), "rejected moves emit nothing");
        Ok(())
    }

    #[tokio::test]
    async fn test_moving_under_own_descendant_is_a_cycle() -> Result<()> {
        let f = setup(HierarchyConfig::default(), OrphanPolicy::default()).await?;
        add(&f, "a", None).await?;
        add(&f, "b", Some("a")).await?;
        add(&f, "c", Some("b")).await?;
        let before = stored(&f).await?;

        let err = f
            .service
            .move_chapter(&f.user, &f.book.id, &MoveRequest::new("a", Some("c".into()), 0))
            .await
            .unwrap_err();

        match err {
            ChapterServiceError::Rejected(HierarchyError::CycleDetected { chain }) => {
                for id in ["a", "b", "c"] {
                    assert!(chain.iter().any(|c| c == id), "{} missing from {:?}", id, chain);
                }
            }
            other => panic!("Expected CycleDetected, got {:?}", other),
        }
        assert_eq!(stored(&f).await?, before);
        Ok(())
    }

    #[tokio::test]
    async fn test_move_emits_repositioned_event_after_commit() -> Result<()> {
        let f = setup(HierarchyConfig::default(), OrphanPolicy::default()).await?;
        add(&f, "a", None).await?;
        add(&f, "b", None).await?;

        let mut rx = f.service.subscribe();
        f.service
            .move_chapter(&f.user, &f.book.id, &MoveRequest::new("b", Some("a".into()), 0))
            .await?;

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("Event should be emitted within 1 second")
            .expect("Should receive event");

        match event {
            DomainEvent::ChaptersRepositioned {
                book_id,
                revision,
                positions,
            } => {
                assert_eq!(book_id, f.book.id);
                assert_eq!(revision, 3);
                assert_eq!(
                    positions,
                    vec![ChapterPosition {
                        id: "b".to_string(),
                        order: 0,
                        level: 1,
                        parent_id: Some("a".to_string()),
                    }]
                );
            }
            other => panic!("Expected ChaptersRepositioned, got {:?}", other),
        }
        Ok(())
    }

    #[tokio::test]
    async fn test_bulk_order_updates_normalize() -> Result<()> {
        let f = setup(HierarchyConfig::default(), OrphanPolicy::default()).await?;
        for id in ["a", "b", "c"] {
            add(&f, id, None).await?;
        }

        // Gapped orders and a bogus level from the client
        let positions = vec![
            ChapterPosition {
                id: "c".to_string(),
                order: 10,
                level: 7,
                parent_id: Some("a".to_string()),
            },
            ChapterPosition {
                id: "b".to_string(),
                order: 5,
                level: 0,
                parent_id: None,
            },
        ];
        f.service
            .apply_order_updates(&f.user, &f.book.id, &positions)
            .await?;

        assert_eq!(
            stored(&f).await?,
            vec![row("a", None, 0, 0), row("b", None, 1, 0), row("c", Some("a"), 0, 1)]
        );
        assert_invariants(&f).await
    }

    #[tokio::test]
    async fn test_delete_promotes_children_by_default() -> Result<()> {
        let f = setup(HierarchyConfig::default(), OrphanPolicy::PromoteToParent).await?;
        add(&f, "a", None).await?;
        add(&f, "b", None).await?;
        add(&f, "c", None).await?;
        add(&f, "b1", Some("b")).await?;
        add(&f, "b2", Some("b")).await?;
        add(&f, "b2x", Some("b2")).await?;

        let removed = f
            .service
            .delete_chapter(&f.user, &f.book.id, "b")
            .await?;
        assert_eq!(removed, vec!["b"]);

        assert_eq!(
            stored(&f).await?,
            vec![
                row("a", None, 0, 0),
                row("b1", None, 1, 0),
                row("b2", None, 2, 0),
                row("b2x", Some("b2"), 0, 1),
                row("c", None, 3, 0),
            ]
        );
        assert_invariants(&f).await
    }

    #[tokio::test]
    async fn test_delete_cascade_removes_subtree() -> Result<()> {
        let f = setup(HierarchyConfig::default(), OrphanPolicy::CascadeDelete).await?;
        add(&f, "a", None).await?;
        add(&f, "b", None).await?;
        add(&f, "b1", Some("b")).await?;
        add(&f, "b1x", Some("b1")).await?;
        add(&f, "c", None).await?;

        let mut rx = f.service.subscribe();
        let mut removed = f
            .service
            .delete_chapter(&f.user, &f.book.id, "b")
            .await?;
        removed.sort();
        assert_eq!(removed, vec!["b", "b1", "b1x"]);

        assert_eq!(
            stored(&f).await?,
            vec![row("a", None, 0, 0), row("c", None, 1, 0)]
        );

        match rx.try_recv()? {
            DomainEvent::ChaptersDeleted { ids, .. } => assert_eq!(ids.len(), 3),
            other => panic!("Expected ChaptersDeleted, got {:?}", other),
        }
        assert_invariants(&f).await
    }

    #[tokio::test]
    async fn test_delete_unknown_chapter() -> Result<()> {
        let f = setup(HierarchyConfig::default(), OrphanPolicy::default()).await?;
        let err = f
            .service
            .delete_chapter(&f.user, &f.book.id, "ghost")
            .await
            .unwrap_err();
        assert!(matches!(err, ChapterServiceError::ChapterNotFound { .. }));
        Ok(())
    }

    #[tokio::test]
    async fn test_other_user_cannot_touch_book() -> Result<()> {
        let f = setup(HierarchyConfig::default(), OrphanPolicy::default()).await?;
        add(&f, "a", None).await?;
        let mallory = CurrentUser::new("mallory");

        let err = f
            .service
            .move_chapter(&mallory, &f.book.id, &MoveRequest::new("a", None, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ChapterServiceError::AccessDenied { .. }));

        let err = f
            .service
            .update_chapter_content(&mallory, "a", ChapterContentUpdate::new().with_title("Mine"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChapterServiceError::AccessDenied { .. }));

        assert_eq!(
            f.service.get_chapter(&f.user, "a").await?.title,
            "Chapter a"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_get_tree_nests_children_in_order() -> Result<()> {
        let f = setup(HierarchyConfig::default(), OrphanPolicy::default()).await?;
        add(&f, "a", None).await?;
        add(&f, "a1", Some("a")).await?;
        add(&f, "a2", Some("a")).await?;
        add(&f, "b", None).await?;
        f.service
            .move_chapter(&f.user, &f.book.id, &MoveRequest::new("a2", Some("a".into()), 0))
            .await?;

        let tree = f.service.get_tree(&f.user, &f.book.id).await?;
        assert_eq!(tree.len(), 2);
        let children: Vec<_> = tree[0].children.iter().map(|n| n.chapter.id.as_str()).collect();
        assert_eq!(children, vec!["a2", "a1"]);
        assert_eq!(tree[0].subtree_len(), 3);
        Ok(())
    }
}
