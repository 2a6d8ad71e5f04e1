use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::thread;

use menuicon_core::apartment::{run_affine, Apartment, ApartmentError, StaApartment};

#[test]
fn all_work_runs_on_one_dedicated_thread() {
    let apartment = Arc::new(StaApartment::spawn("test-sta").unwrap());
    let worker = apartment.worker_id();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let apartment = Arc::clone(&apartment);
            thread::spawn(move || {
                let caller = thread::current().id();
                let ran_on = run_affine(apartment.as_ref(), || thread::current().id()).unwrap();
                (caller, ran_on)
            })
        })
        .collect();

    let mut ran_on = HashSet::new();
    for handle in handles {
        let (caller, worker_thread) = handle.join().unwrap();
        assert_ne!(caller, worker_thread);
        ran_on.insert(worker_thread);
    }
    assert_eq!(ran_on.len(), 1);
    assert!(ran_on.contains(&worker));
    apartment.shutdown();
}

#[test]
fn jobs_from_one_caller_run_in_submission_order() {
    let apartment = StaApartment::spawn("test-sta-order").unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    for i in 0..20 {
        let seen = Arc::clone(&seen);
        apartment
            .dispatch(Box::new(move || seen.lock().unwrap().push(i)))
            .unwrap();
    }
    apartment.shutdown();

    assert_eq!(*seen.lock().unwrap(), (0..20).collect::<Vec<_>>());
}

#[test]
fn panicking_work_is_reported_and_worker_survives() {
    let apartment = StaApartment::spawn("test-sta-panic").unwrap();

    let failed = run_affine(&apartment, || -> u32 { panic!("shell exploded") });
    assert_eq!(
        failed,
        Err(ApartmentError::WorkerPanicked("shell exploded".to_string()))
    );

    assert_eq!(run_affine(&apartment, || 7_u32), Ok(7));
}

#[test]
fn work_after_shutdown_is_rejected() {
    let apartment = StaApartment::spawn("test-sta-closed").unwrap();
    apartment.shutdown();

    assert_eq!(
        run_affine(&apartment, || 1_u32),
        Err(ApartmentError::WorkerUnavailable)
    );
}
