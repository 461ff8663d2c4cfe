mod common;

use std::sync::{Arc, Mutex};

use common::User;
use rust_sqlite_orm::{
    Database, EventTarget, Interceptor, OperationKind, Params, QueryEvent, Verdict,
};

fn db() -> anyhow::Result<Database> {
    let db = Database::open_in_memory()?;
    db.create_table::<User>()?;
    Ok(db)
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
}

impl Interceptor for Recorder {
    fn before(&self, event: &QueryEvent<'_>) -> Verdict {
        let target = match event.target {
            EventTarget::Condition { condition, .. } => condition.unwrap_or("*").to_string(),
            EventTarget::Collection(rows) => format!("{} rows", rows.len()),
        };
        self.seen
            .lock()
            .unwrap()
            .push(format!("{} {} {}", event.kind, event.table, target));
        Verdict::Continue
    }
}

#[test]
fn aborted_insert_sends_nothing() -> anyhow::Result<()> {
    let db = db()?;
    db.intercept(|event: &QueryEvent<'_>| {
        if event.kind == OperationKind::Insert {
            Verdict::Abort
        } else {
            Verdict::Continue
        }
    });

    let mut batch = common::users(3);
    let err = db.insert_all(&mut batch).unwrap_err();
    assert!(err.is_aborted());
    assert!(batch.iter().all(|u| u.id.is_none()));
    assert_eq!(db.count::<User>(None, None)?, 0);

    // other verbs are unaffected by the earlier abort
    assert_eq!(db.select::<User>()?.count(), 0);
    Ok(())
}

#[test]
fn every_verb_is_observed_in_order() -> anyhow::Result<()> {
    let db = db()?;
    let recorder = Arc::new(Recorder::default());
    db.add_interceptor(recorder.clone());

    let mut batch = common::users(2);
    db.insert_all(&mut batch)?;
    db.select::<User>()?.for_each(drop);
    db.update(&batch[0])?;
    db.delete_all(&batch)?;
    db.delete_where::<User>("age > @age", Some(&Params::new().with_value("age", 3)))?;

    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            "insert users 2 rows",
            "select users *",
            "update users 1 rows",
            "delete users 2 rows",
            "delete users age > @age",
        ]
    );
    Ok(())
}

#[test]
fn hooks_run_in_registration_order_until_abort() -> anyhow::Result<()> {
    let db = db()?;
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = order.clone();
    db.intercept(move |_: &QueryEvent<'_>| {
        first.lock().unwrap().push("first");
        Verdict::Continue
    });
    let second = order.clone();
    db.intercept(move |event: &QueryEvent<'_>| {
        second.lock().unwrap().push("second");
        if event.kind == OperationKind::Delete {
            Verdict::Abort
        } else {
            Verdict::Continue
        }
    });
    let third = order.clone();
    db.intercept(move |_: &QueryEvent<'_>| {
        third.lock().unwrap().push("third");
        Verdict::Continue
    });

    let mut user = User::new("kept");
    db.insert(&mut user)?;
    assert!(db.delete(&user).unwrap_err().is_aborted());
    assert_eq!(db.count::<User>(None, None)?, 1);

    assert_eq!(
        *order.lock().unwrap(),
        vec!["first", "second", "third", "first", "second"]
    );
    Ok(())
}

#[test]
fn events_carry_the_entity_type() -> anyhow::Result<()> {
    let db = db()?;
    let entity = Arc::new(Mutex::new(String::new()));
    let sink = entity.clone();
    db.intercept(move |event: &QueryEvent<'_>| {
        *sink.lock().unwrap() = event.entity.to_string();
        Verdict::Continue
    });
    db.select::<User>()?;
    assert!(entity.lock().unwrap().ends_with("User"));
    Ok(())
}
