use std::any::Any;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use node_core::clock;
use node_core::error::Error;
use node_core::job::{activation, ArgList, Job, JobArg, JobRecord, OutSlot};
use node_core::JobManager;

fn add_two(params: ArgList<'_>, out: OutSlot<'_>) {
    let x = params[0].as_int().unwrap_or(0);
    let y = params[1].as_int().unwrap_or(0);
    if let Some(slot) = out.and_then(|o| o.downcast_mut::<i64>()) {
        *slot = x + y;
    }
}

fn signed_sum(params: ArgList<'_>, out: OutSlot<'_>) {
    let x = params[0].as_int().unwrap_or(0);
    let y = params[1].as_int().unwrap_or(0);
    let keep_sign = params[2].as_int().unwrap_or(0) != 0;
    if let Some(slot) = out.and_then(|o| o.downcast_mut::<i64>()) {
        *slot = if keep_sign { x + y } else { -(x + y) };
    }
}

#[derive(Default)]
struct Pair {
    a: i64,
    b: i64,
}

fn pair_job(params: ArgList<'_>, out: OutSlot<'_>) {
    let x = params[0].as_int().unwrap_or(0);
    let y: i64 = params[1]
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);
    let plus = params[2].as_int().unwrap_or(0) != 0;
    if let Some(slot) = out.and_then(|o| o.downcast_mut::<Pair>()) {
        slot.a = if plus { x + y } else { -(x + y) };
        slot.b = 97;
    }
}

struct Counting(Arc<AtomicU64>);

impl Job for Counting {
    fn invoke(&self, _params: ArgList<'_>, _out: OutSlot<'_>) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn direct_integer_job() {
    let mut manager = JobManager::init_with_use_type(101, 20, 12).unwrap();
    manager.add_job("TESTJOB1", JobRecord::new(add_two)).unwrap();

    let mut out: i64 = 0;
    manager
        .perform_job(
            "TESTJOB1",
            &[JobArg::Int(1), JobArg::Int(2)],
            Some(&mut out as &mut dyn Any),
        )
        .unwrap();
    assert_eq!(out, 3);
    manager.delete();
}

#[test]
fn json_request_with_false_literal() {
    let mut manager = JobManager::init_with_use_type(102, 20, 12).unwrap();
    manager.add_job("TESTJOB2", JobRecord::new(signed_sum)).unwrap();

    let mut out: i64 = 0;
    manager
        .request_job("[ \"TESTJOB2\", 1, 2, false ]", Some(&mut out as &mut dyn Any))
        .unwrap();
    assert_eq!(out, -3);
    manager.delete();
}

#[test]
fn json_request_with_string_and_bool() {
    let mut manager = JobManager::init_with_use_type(103, 20, 12).unwrap();
    manager.add_job("TESTJOB3", JobRecord::new(pair_job)).unwrap();

    let mut ret = Pair::default();
    manager
        .request_job("[ \"TESTJOB3\", -7, \"2\", true ]", Some(&mut ret as &mut dyn Any))
        .unwrap();
    assert_eq!(ret.a, -5);
    assert_eq!(ret.b, 97);
    manager.delete();
}

#[test]
fn always_firing_job_dispatches_each_pass() {
    let mut manager = JobManager::init_with_use_type(104, 10, 5).unwrap();
    let count = Arc::new(AtomicU64::new(0));
    manager
        .add_job(
            "job1",
            JobRecord::new(Counting(count.clone())).with_activation(activation::always()),
        )
        .unwrap();

    for _ in 0..2 {
        let before = clock::now();
        manager.queue_scheduled_jobs().unwrap();
        let record = manager.get_job("job1").unwrap();
        assert!(record.last_scheduled_time >= before);
        assert!(record.last_scheduled_time <= clock::now());

        manager.execute_queued_job().unwrap();
        let record = manager.get_job("job1").unwrap();
        assert!(record.last_execution_time >= record.last_scheduled_time);
    }

    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert_eq!(manager.queued_jobs(), 0);
    manager.delete();
}

#[test]
fn rate_limited_job_dispatches_once_per_window() {
    let mut manager = JobManager::init_with_use_type(105, 10, 5).unwrap();
    let first = Arc::new(AtomicU64::new(0));
    let second = Arc::new(AtomicU64::new(0));

    manager
        .add_job(
            "job1",
            JobRecord::new(Counting(first.clone())).with_activation(activation::always()),
        )
        .unwrap();

    let mut limited =
        JobRecord::new(Counting(second.clone())).with_activation(activation::every(1000));
    limited.last_execution_time = clock::now();
    manager.add_job("job2", limited).unwrap();

    // not due yet: only job1 fires
    manager.queue_scheduled_jobs().unwrap();
    assert_eq!(manager.queued_jobs(), 1);
    manager.execute_queued_job().unwrap();

    clock::set_now(clock::now() + 3000);

    // first pass past the window: both fire, FIFO in key order
    manager.queue_scheduled_jobs().unwrap();
    assert_eq!(manager.queued_jobs(), 2);
    manager.execute_queued_job().unwrap();
    assert_eq!(first.load(Ordering::SeqCst), 2);
    assert_eq!(second.load(Ordering::SeqCst), 0);
    manager.execute_queued_job().unwrap();
    assert_eq!(second.load(Ordering::SeqCst), 1);

    // immediate second pass: job2 was just executed and stamped
    manager.queue_scheduled_jobs().unwrap();
    assert_eq!(manager.queued_jobs(), 1);
    manager.execute_queued_job().unwrap();
    manager.execute_queued_job().unwrap();

    assert_eq!(first.load(Ordering::SeqCst), 3);
    assert_eq!(second.load(Ordering::SeqCst), 1);
    assert_eq!(manager.queued_jobs(), 0);
    manager.delete();
}

#[test]
fn malformed_json_requests_are_rejected() {
    let mut manager = JobManager::init_with_use_type(106, 20, 12).unwrap();
    manager.add_job("TESTJOB1", JobRecord::new(add_two)).unwrap();

    assert_eq!(manager.request_job("[]", None).err(), Some(Error::UnsupportedJsonFormat));
    assert_eq!(manager.request_job("{}", None).err(), Some(Error::UnsupportedJsonFormat));
    assert_eq!(
        manager.request_job("[ 5, 1 ]", None).err(),
        Some(Error::UnsupportedJsonFormat)
    );
    assert_eq!(
        manager.request_job("not json", None).err(),
        Some(Error::UnsupportedJsonFormat)
    );
    manager.delete();
}

#[test]
fn oversized_requests_exhaust_the_token_budget() {
    let mut manager = JobManager::init_with_use_type(107, 20, 4).unwrap();
    manager.add_job("TESTJOB1", JobRecord::new(add_two)).unwrap();

    // four tokens fit, five do not
    let mut out: i64 = 0;
    manager
        .request_job("[ \"TESTJOB1\", 1, 2 ]", Some(&mut out as &mut dyn Any))
        .unwrap();
    assert_eq!(out, 3);
    assert_eq!(
        manager.request_job("[ \"TESTJOB1\", 1, 2, 3 ]", None).err(),
        Some(Error::UnsupportedJsonFormat)
    );
    manager.delete();
}

#[test]
fn unknown_job_lookup_fails() {
    let mut manager = JobManager::init_with_use_type(108, 20, 12).unwrap();
    assert_eq!(
        manager.perform_job("missing", &[], None).err(),
        Some(Error::DictGet)
    );
    assert_eq!(
        manager.request_job("[ \"missing\" ]", None).err(),
        Some(Error::DictGet)
    );
    manager.delete();
}

#[test]
fn registry_survives_unclean_drop_and_reopen() {
    {
        let mut manager = JobManager::init_with_use_type(109, 20, 12).unwrap();
        manager.add_job("TESTJOB1", JobRecord::new(add_two)).unwrap();
        // dropped without delete, like a restart without clean shutdown
    }

    let mut manager = JobManager::init_with_use_type(109, 20, 12).unwrap();
    let mut out: i64 = 0;
    manager
        .perform_job(
            "TESTJOB1",
            &[JobArg::Int(20), JobArg::Int(22)],
            Some(&mut out as &mut dyn Any),
        )
        .unwrap();
    assert_eq!(out, 42);
    manager.delete();
}

#[test]
fn delete_destroys_registry_and_queue() {
    let count = Arc::new(AtomicU64::new(0));
    {
        let mut manager = JobManager::init_with_use_type(110, 10, 5).unwrap();
        manager
            .add_job(
                "job1",
                JobRecord::new(Counting(count.clone())).with_activation(activation::always()),
            )
            .unwrap();
        manager.queue_scheduled_jobs().unwrap();
        assert_eq!(manager.queued_jobs(), 1);
        manager.delete();
    }

    // queued copy was discarded, never executed
    assert_eq!(count.load(Ordering::SeqCst), 0);

    let manager = JobManager::init_with_use_type(110, 10, 5).unwrap();
    assert_eq!(manager.get_job("job1").err(), Some(Error::DictGet));
    manager.delete();
}

#[test]
fn queued_copy_outlives_registry_removal() {
    let count = Arc::new(AtomicU64::new(0));
    let mut manager = JobManager::init_with_use_type(111, 10, 5).unwrap();
    manager
        .add_job(
            "job1",
            JobRecord::new(Counting(count.clone())).with_activation(activation::always()),
        )
        .unwrap();

    manager.queue_scheduled_jobs().unwrap();
    manager.remove_job("job1").unwrap();

    // the job still runs; only the bookkeeping update fails
    assert_eq!(manager.execute_queued_job().err(), Some(Error::DictUpdate));
    assert_eq!(count.load(Ordering::SeqCst), 1);
    manager.delete();
}

#[test]
fn duplicate_job_names_are_rejected() {
    let mut manager = JobManager::init_with_use_type(112, 20, 12).unwrap();
    manager.add_job("TESTJOB1", JobRecord::new(add_two)).unwrap();
    assert_eq!(
        manager.add_job("TESTJOB1", JobRecord::new(add_two)).err(),
        Some(Error::AddJob)
    );
    manager.delete();
}
