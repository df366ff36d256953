//! Integration tests for the database layer.
//!
//! These tests verify the core database operations using an in-memory SQLite database.
//! Tests are organized by module and functionality.

use chrono::{DateTime, Duration, NaiveDate};
use std::collections::HashSet;
use meeting_planner::db::Database;
use meeting_planner::error::{ErrorCode, InstantiationError, StoreError, Warning};
use meeting_planner::instantiate::{IdSource, InstantiateOptions, SequentialIds};
use meeting_planner::roles::Role;
use meeting_planner::types::{
    DependencyPolicy, Person, ProjectTemplate, Schedule, TaskStatus, TemplateDefinition,
    TemplateMilestone, TemplateTask,
};

/// Helper to create a fresh in-memory database for testing.
fn setup_db() -> Database {
    Database::open_in_memory().expect("Failed to create in-memory database")
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn task(id: &str, parent: Option<&str>, milestone: Option<&str>, schedule: Schedule, roles: &[Role]) -> TemplateTask {
    TemplateTask {
        id: id.to_string(),
        title: id.replace('-', " "),
        description: None,
        level: 0,
        parent_task_id: parent.map(String::from),
        milestone_id: milestone.map(String::from),
        sort_order: 0,
        schedule,
        assigned_to_roles: roles.to_vec(),
    }
}

/// Annual review: prep work before the meeting, follow-up after it.
fn review_template() -> TemplateDefinition {
    TemplateDefinition {
        template: ProjectTemplate {
            id: "annual-review".into(),
            name: "Annual Review".into(),
            description: Some("Yearly client review".into()),
        },
        milestones: vec![
            TemplateMilestone {
                id: "prep".into(),
                title: "Preparation".into(),
                description: None,
                sort_order: 1,
            },
            TemplateMilestone {
                id: "follow".into(),
                title: "Follow-up".into(),
                description: None,
                sort_order: 2,
            },
        ],
        tasks: vec![
            task("send-agenda", None, Some("prep"), Schedule::same_date_as("gather-statements"), &[Role::Advisor]),
            task("gather-statements", None, Some("prep"), Schedule::offset(-80), &[Role::Paraplanner, Role::Operations]),
            task("tax-review", Some("gather-statements"), None, Schedule::days_after("gather-statements", 5), &[Role::TaxPlanner]),
            task("meeting-notes", None, Some("follow"), Schedule::offset(1), &[Role::Advisor, Role::AssociateAdvisor]),
            task("compliance-file", Some("meeting-notes"), None, Schedule::None, &[Role::Compliance]),
        ],
    }
}

fn seed_roster(db: &Database) {
    let people = [
        ("alex", "Alex Advisor", vec![Role::Advisor], true),
        ("pat", "Pat Planner", vec![Role::Paraplanner, Role::TaxPlanner], true),
        ("olive", "Olive Ops", vec![Role::Operations], true),
        ("retired", "Former Advisor", vec![Role::Advisor, Role::Compliance], false),
    ];
    for (id, name, roles, active) in people {
        db.upsert_person(&Person {
            id: id.into(),
            name: name.into(),
            roles,
            active,
        })
        .unwrap();
    }
}

mod template_tests {
    use super::*;

    #[test]
    fn save_and_get_preserves_structure() {
        let db = setup_db();
        let template = review_template();
        db.save_template(&template).unwrap();

        let stored = db.get_template("annual-review").unwrap().unwrap();
        assert_eq!(stored.template, template.template);
        assert_eq!(stored.milestones, template.milestones);
        assert_eq!(stored.tasks.len(), 5);

        let gather = stored.tasks.iter().find(|t| t.id == "gather-statements").unwrap();
        assert_eq!(gather.schedule, Schedule::offset(-80));
        assert_eq!(gather.assigned_to_roles, vec![Role::Paraplanner, Role::Operations]);

        let tax = stored.tasks.iter().find(|t| t.id == "tax-review").unwrap();
        assert_eq!(
            tax.schedule,
            Schedule::Dependent {
                depends_on_task_id: "gather-statements".into(),
                policy: DependencyPolicy::DaysAfter { days: 5 },
            }
        );
    }

    #[test]
    fn save_normalizes_stored_levels() {
        let db = setup_db();
        let mut template = review_template();
        template.tasks[2].level = 7;
        db.save_template(&template).unwrap();

        let stored = db.get_template("annual-review").unwrap().unwrap();
        let tax = stored.tasks.iter().find(|t| t.id == "tax-review").unwrap();
        assert_eq!(tax.level, 1);
    }

    #[test]
    fn template_locked_once_project_exists() {
        let db = setup_db();
        db.save_template(&review_template()).unwrap();
        assert!(!db.is_template_locked("annual-review").unwrap());

        // Editing is fine before any project
        let mut edited = review_template();
        edited.template.name = "Annual Review v2".into();
        db.save_template(&edited).unwrap();

        db.instantiate_template(
            "annual-review",
            date("2025-10-01"),
            &mut SequentialIds::new("p"),
            &InstantiateOptions::new(),
        )
        .unwrap();
        assert!(db.is_template_locked("annual-review").unwrap());

        let err = db.save_template(&review_template()).unwrap_err();
        let store = err.downcast_ref::<StoreError>().unwrap();
        assert_eq!(store.code(), ErrorCode::TemplateLocked);

        let err = db.delete_template("annual-review").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StoreError>(),
            Some(StoreError::TemplateLocked { projects: 1, .. })
        ));
    }

    #[test]
    fn list_and_delete_stored_templates() {
        let db = setup_db();
        db.save_template(&review_template()).unwrap();
        let mut other = review_template();
        other.template.id = "onboarding".into();
        db.save_template(&other).unwrap();

        let ids: Vec<String> = db.list_stored_templates().unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["annual-review", "onboarding"]);

        db.delete_template("onboarding").unwrap();
        assert!(db.get_template("onboarding").unwrap().is_none());
        assert!(db.delete_template("onboarding").is_err());
    }
}

mod roster_tests {
    use super::*;

    #[test]
    fn upsert_replaces_roles() {
        let db = setup_db();
        seed_roster(&db);
        db.upsert_person(&Person {
            id: "pat".into(),
            name: "Pat Planner".into(),
            roles: vec![Role::EstateAttorney],
            active: true,
        })
        .unwrap();

        let people = db.list_people().unwrap();
        assert_eq!(people.len(), 4);
        let pat = people.iter().find(|p| p.id == "pat").unwrap();
        assert_eq!(pat.roles, vec![Role::EstateAttorney]);
    }

    #[test]
    fn active_roster_skips_inactive_people() {
        let db = setup_db();
        seed_roster(&db);

        let roster = db.active_roster().unwrap();
        assert_eq!(roster.active_count(), 3);
        assert_eq!(roster.people_with(Role::Advisor), &["alex".to_string()]);
        assert!(roster.people_with(Role::Compliance).is_empty());

        assert!(db.set_person_active("alex", false).unwrap());
        assert!(db.active_roster().unwrap().people_with(Role::Advisor).is_empty());
        assert!(!db.set_person_active("nobody", true).unwrap());
    }
}

mod project_tests {
    use super::*;

    fn create(db: &Database, prefix: &str, meeting: &str) -> meeting_planner::instantiate::Instantiation {
        db.instantiate_template(
            "annual-review",
            date(meeting),
            &mut SequentialIds::new(prefix),
            &InstantiateOptions::new().with_name("Smith annual review"),
        )
        .unwrap()
    }

    fn setup_with_template() -> Database {
        let db = setup_db();
        db.save_template(&review_template()).unwrap();
        seed_roster(&db);
        db
    }

    #[test]
    fn instantiate_persists_complete_project() {
        let db = setup_with_template();
        let result = create(&db, "p", "2025-10-01");

        let stored = db.get_project(&result.project.id).unwrap().unwrap();
        assert_eq!(stored, result.project);
        assert_eq!(stored.name, "Smith annual review");
        assert_eq!(stored.tasks.len(), 5);

        let live = |tpl: &str| {
            let id = &result.id_map[tpl];
            stored.tasks.iter().find(|t| &t.id == id).unwrap()
        };
        assert_eq!(live("gather-statements").due_date, Some(date("2025-07-13")));
        assert_eq!(live("send-agenda").due_date, Some(date("2025-07-13")));
        assert_eq!(live("tax-review").due_date, Some(date("2025-07-18")));
        assert_eq!(live("meeting-notes").due_date, Some(date("2025-10-02")));
        assert_eq!(live("compliance-file").due_date, None);

        assert_eq!(live("gather-statements").assigned_to, vec!["pat", "olive"]);
        assert_eq!(live("tax-review").assigned_to, vec!["pat"]);
        assert_eq!(live("meeting-notes").assigned_to, vec!["alex"]);
        assert!(live("compliance-file").assigned_to.is_empty());

        // Prep milestone closes with its latest task
        assert_eq!(stored.milestones[0].due_date, Some(date("2025-07-18")));
        assert_eq!(stored.milestones[1].due_date, Some(date("2025-10-02")));
    }

    #[test]
    fn instantiate_reports_unassigned_roles() {
        let db = setup_with_template();
        let result = create(&db, "p", "2025-10-01");

        let mut roles: Vec<Role> = result
            .warnings
            .iter()
            .filter_map(|w| match w {
                Warning::UnassignedRole(w) => Some(w.role),
                _ => None,
            })
            .collect();
        roles.sort();
        assert_eq!(roles, vec![Role::AssociateAdvisor, Role::Compliance]);
    }

    #[test]
    fn dependents_created_after_their_targets() {
        let db = setup_with_template();
        let result = create(&db, "p", "2025-10-01");

        let position = |tpl: &str| result.creation_order.iter().position(|id| id == tpl).unwrap();
        assert!(position("gather-statements") < position("send-agenda"));
        assert!(position("gather-statements") < position("tax-review"));
        assert!(position("meeting-notes") < position("compliance-file"));
        // Independent roots first
        assert_eq!(result.independent_count, 3);
    }

    #[test]
    fn unknown_template_is_reported() {
        let db = setup_db();
        let err = db
            .instantiate_template(
                "missing",
                date("2025-10-01"),
                &mut SequentialIds::new("p"),
                &InstantiateOptions::new(),
            )
            .unwrap_err();
        assert_eq!(
            err.downcast_ref::<StoreError>(),
            Some(&StoreError::TemplateNotFound("missing".into()))
        );
    }

    #[test]
    fn failed_instantiation_leaves_nothing_behind() {
        let db = setup_db();
        let mut template = review_template();
        template.tasks[1].schedule = Schedule::same_date_as("send-agenda");
        db.save_template(&template).unwrap();

        let err = db
            .instantiate_template(
                "annual-review",
                date("2025-10-01"),
                &mut SequentialIds::new("p"),
                &InstantiateOptions::new(),
            )
            .unwrap_err();
        let inst = err.downcast_ref::<InstantiationError>().unwrap();
        assert_eq!(inst.code(), ErrorCode::DependencyCycle);

        assert!(db.list_projects().unwrap().is_empty());
        assert!(!db.is_template_locked("annual-review").unwrap());
    }

    #[test]
    fn reschedule_moves_every_date() {
        let db = setup_with_template();
        let result = create(&db, "p", "2025-10-01");

        let moved = db.reschedule_project(&result.project.id, date("2025-10-15")).unwrap();
        assert_eq!(moved.reference_date, date("2025-10-15"));
        for (before, after) in result.project.tasks.iter().zip(&moved.tasks) {
            assert_eq!(before.id, after.id);
            assert_eq!(after.due_date, before.due_date.map(|d| d + Duration::days(14)));
        }

        let stored = db.get_project(&result.project.id).unwrap().unwrap();
        assert_eq!(stored.tasks, moved.tasks);
        assert_eq!(stored.milestones[1].due_date, Some(date("2025-10-16")));

        let err = db.reschedule_project("nope", date("2025-10-15")).unwrap_err();
        assert_eq!(err.downcast_ref::<StoreError>().map(StoreError::code), Some(ErrorCode::ProjectNotFound));
    }

    #[test]
    fn reschedule_out_of_calendar_is_rejected() {
        let db = setup_with_template();
        let result = create(&db, "p", "2025-10-01");

        // meeting-notes sits one day after the meeting
        let err = db.reschedule_project(&result.project.id, NaiveDate::MAX).unwrap_err();
        let inst = err.downcast_ref::<InstantiationError>().unwrap();
        assert_eq!(inst.code(), ErrorCode::DateOutOfRange);

        let stored = db.get_project(&result.project.id).unwrap().unwrap();
        assert_eq!(stored, result.project);
    }

    /// Sequential ids that step over anything reserved.
    struct SkipReserved {
        inner: SequentialIds,
        reserved: HashSet<String>,
    }

    impl IdSource for SkipReserved {
        fn next_id(&mut self) -> String {
            loop {
                let id = self.inner.next_id();
                if self.reserved.insert(id.clone()) {
                    return id;
                }
            }
        }

        fn reserve(&mut self, id: &str) {
            self.reserved.insert(id.to_string());
        }
    }

    #[test]
    fn new_project_never_reuses_stored_ids() {
        let db = setup_with_template();
        let first = create(&db, "p", "2025-10-01");

        let mut ids = SkipReserved {
            inner: SequentialIds::new("p"),
            reserved: HashSet::new(),
        };
        let second = db
            .instantiate_template("annual-review", date("2026-10-01"), &mut ids, &InstantiateOptions::new())
            .unwrap();

        // project + 2 milestones + 5 tasks were already taken
        assert!(ids.reserved.contains("p-8"));
        let taken: HashSet<&str> = first.project.tasks.iter().map(|t| t.id.as_str()).collect();
        assert!(second.project.tasks.iter().all(|t| !taken.contains(t.id.as_str())));
        assert_ne!(first.project.id, second.project.id);
        assert_eq!(db.list_projects().unwrap().len(), 2);
    }

    #[test]
    fn status_changes_keep_completed_at_consistent() {
        let db = setup_with_template();
        let result = create(&db, "p", "2025-10-01");
        let task_id = result.id_map["meeting-notes"].clone();

        let done = db.set_task_status(&task_id, TaskStatus::Completed).unwrap();
        assert_eq!(done.status, TaskStatus::Completed);
        assert!(done.completed_at.is_some());

        let reopened = db.set_task_status(&task_id, TaskStatus::InProgress).unwrap();
        assert_eq!(reopened.status, TaskStatus::InProgress);
        assert!(reopened.completed_at.is_none());

        let err = db.set_task_status("ghost", TaskStatus::Completed).unwrap_err();
        assert_eq!(err.downcast_ref::<StoreError>().map(StoreError::code), Some(ErrorCode::TaskNotFound));
    }

    #[test]
    fn completion_moves_after_completion_dependents() {
        let db = setup_db();
        let mut template = review_template();
        template.tasks.push(task(
            "thank-you",
            None,
            Some("follow"),
            Schedule::Dependent {
                depends_on_task_id: "meeting-notes".into(),
                policy: DependencyPolicy::AfterCompletion { days: 2 },
            },
            &[],
        ));
        db.save_template(&template).unwrap();

        let result = create(&db, "p", "2025-10-01");
        let notes_id = result.id_map["meeting-notes"].clone();
        let thanks_id = result.id_map["thank-you"].clone();

        // Open target: measured from its due date
        let project = db.get_project(&result.project.id).unwrap().unwrap();
        let thanks = project.tasks.iter().find(|t| t.id == thanks_id).unwrap();
        assert_eq!(thanks.due_date, Some(date("2025-10-04")));

        let done = db.set_task_status(&notes_id, TaskStatus::Completed).unwrap();
        let completed_on = DateTime::from_timestamp_millis(done.completed_at.unwrap())
            .unwrap()
            .date_naive();

        let project = db.get_project(&result.project.id).unwrap().unwrap();
        let thanks = project.tasks.iter().find(|t| t.id == thanks_id).unwrap();
        assert_eq!(thanks.due_date, Some(completed_on + Duration::days(2)));
    }

    #[test]
    fn progress_counts_descendants() {
        let db = setup_with_template();
        let result = create(&db, "p", "2025-10-01");

        db.set_task_status(&result.id_map["gather-statements"], TaskStatus::Completed)
            .unwrap();
        db.set_task_status(&result.id_map["send-agenda"], TaskStatus::Completed)
            .unwrap();

        let progress = db.project_progress(&result.project.id).unwrap();
        assert_eq!(progress.len(), 2);
        let (prep, prep_progress) = &progress[0];
        assert_eq!(prep.title, "Preparation");
        assert_eq!((prep_progress.completed, prep_progress.total), (2, 3));
        assert_eq!(prep_progress.percent(), 66);

        let (_, follow_progress) = &progress[1];
        assert_eq!(follow_progress.percent(), 0);
        assert_eq!(follow_progress.total, 2);
    }

    #[test]
    fn list_and_delete_projects() {
        let db = setup_with_template();
        let first = create(&db, "a", "2025-10-01");
        create(&db, "b", "2026-04-01");

        let projects = db.list_projects().unwrap();
        assert_eq!(projects.len(), 2);
        assert!(projects.iter().all(|p| p.task_count == 5));

        assert!(db.delete_project(&first.project.id).unwrap());
        assert!(db.get_project(&first.project.id).unwrap().is_none());
        assert_eq!(db.list_projects().unwrap().len(), 1);
        assert!(!db.delete_project(&first.project.id).unwrap());
    }
}
