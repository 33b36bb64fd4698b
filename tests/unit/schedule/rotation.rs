use super::*;
use std::collections::HashSet;

fn id(s: &str) -> AppId {
    AppId::new(s).unwrap()
}

fn timing(display_secs: u64) -> AppTiming {
    AppTiming {
        display: Duration::from_secs(display_secs),
        render_interval: Duration::from_secs(300),
    }
}

fn apps(names: &[&str]) -> Vec<(AppId, AppTiming)> {
    names.iter().map(|n| (id(n), timing(10))).collect()
}

fn all_have_frames(_: &AppId) -> bool {
    true
}

#[test]
fn empty_rotation_is_idle() {
    let mut r = RotationState::new();
    let t0 = Instant::now();
    r.rebuild(Vec::new(), t0);
    assert_eq!(r.phase(), &Phase::Idle);
    assert_eq!(r.tick(t0, all_have_frames), None);
    assert_eq!(r.phase(), &Phase::Idle);
}

#[test]
fn round_robin_wraps_after_display_duration() {
    let mut r = RotationState::new();
    let t0 = Instant::now();
    r.rebuild(apps(&["a", "b", "c"]), t0);

    let mut seen = Vec::new();
    for i in 0..4 {
        let now = t0 + Duration::from_secs(10 * i);
        seen.push(r.tick(now, all_have_frames).unwrap());
        // Mid-slot ticks keep the same app.
        let mid = now + Duration::from_secs(5);
        assert_eq!(r.tick(mid, all_have_frames), seen.last().cloned());
    }
    assert_eq!(seen, vec![id("a"), id("b"), id("c"), id("a")]);
}

#[test]
fn per_app_display_duration_is_honoured() {
    let mut r = RotationState::new();
    let t0 = Instant::now();
    r.rebuild(vec![(id("long"), timing(30)), (id("short"), timing(5))], t0);
    assert_eq!(r.tick(t0, all_have_frames), Some(id("long")));
    assert_eq!(r.tick(t0 + Duration::from_secs(29), all_have_frames), Some(id("long")));
    assert_eq!(r.tick(t0 + Duration::from_secs(30), all_have_frames), Some(id("short")));
    assert_eq!(r.tick(t0 + Duration::from_secs(35), all_have_frames), Some(id("long")));
}

#[test]
fn apps_without_frames_are_skipped() {
    let mut r = RotationState::new();
    let t0 = Instant::now();
    r.rebuild(apps(&["a", "b", "c"]), t0);
    let ready = HashSet::from([id("c")]);
    let probe = |a: &AppId| ready.contains(a);
    assert_eq!(r.tick(t0, probe), Some(id("c")));
    assert_eq!(r.tick(t0 + Duration::from_secs(10), probe), Some(id("c")));
}

#[test]
fn stays_advancing_until_some_app_has_frames() {
    let mut r = RotationState::new();
    let t0 = Instant::now();
    r.rebuild(apps(&["a", "b"]), t0);
    assert_eq!(r.tick(t0, |_| false), None);
    assert_eq!(r.phase(), &Phase::Advancing);
    assert_eq!(r.tick(t0 + Duration::from_secs(1), |a| a.as_str() == "b"), Some(id("b")));
    assert!(matches!(r.phase(), Phase::Displaying { app, .. } if app.as_str() == "b"));
}

#[test]
fn rebuild_keeps_displayed_app() {
    let mut r = RotationState::new();
    let t0 = Instant::now();
    r.rebuild(apps(&["a", "b", "c"]), t0);
    r.tick(t0, all_have_frames);
    r.tick(t0 + Duration::from_secs(10), all_have_frames);
    assert_eq!(r.current(), Some(&id("b")));

    r.rebuild(apps(&["x", "b", "c"]), t0 + Duration::from_secs(11));
    assert_eq!(r.tick(t0 + Duration::from_secs(12), all_have_frames), Some(id("b")));
    assert_eq!(r.tick(t0 + Duration::from_secs(20), all_have_frames), Some(id("c")));
}

#[test]
fn removing_displayed_app_moves_to_its_successor() {
    let mut r = RotationState::new();
    let t0 = Instant::now();
    r.rebuild(apps(&["a", "b", "c"]), t0);
    r.tick(t0, all_have_frames);
    r.tick(t0 + Duration::from_secs(10), all_have_frames);
    assert_eq!(r.current(), Some(&id("b")));

    r.rebuild(apps(&["a", "c"]), t0 + Duration::from_secs(11));
    assert_eq!(r.phase(), &Phase::Advancing);
    assert_eq!(r.tick(t0 + Duration::from_secs(11), all_have_frames), Some(id("c")));
}

#[test]
fn removing_last_app_wraps_to_first() {
    let mut r = RotationState::new();
    let t0 = Instant::now();
    r.rebuild(apps(&["a", "b"]), t0);
    r.tick(t0, all_have_frames);
    r.tick(t0 + Duration::from_secs(10), all_have_frames);
    assert_eq!(r.current(), Some(&id("b")));
    r.rebuild(apps(&["a"]), t0 + Duration::from_secs(11));
    assert_eq!(r.tick(t0 + Duration::from_secs(11), all_have_frames), Some(id("a")));
}

#[test]
fn render_due_times_are_independent_of_display() {
    let mut r = RotationState::new();
    let t0 = Instant::now();
    r.rebuild(
        vec![
            (
                id("fast"),
                AppTiming {
                    display: Duration::from_secs(10),
                    render_interval: Duration::from_secs(60),
                },
            ),
            (
                id("slow"),
                AppTiming {
                    display: Duration::from_secs(10),
                    render_interval: Duration::from_secs(600),
                },
            ),
        ],
        t0,
    );
    assert_eq!(r.due_renders(t0), vec![id("fast"), id("slow")]);
    r.mark_scheduled(&id("fast"), t0);
    r.mark_scheduled(&id("slow"), t0);
    assert!(r.due_renders(t0 + Duration::from_secs(59)).is_empty());
    assert_eq!(r.due_renders(t0 + Duration::from_secs(60)), vec![id("fast")]);

    let shown = r.tick(t0 + Duration::from_secs(60), all_have_frames);
    assert_eq!(shown, Some(id("fast")));
    assert_eq!(r.due_renders(t0 + Duration::from_secs(600)).len(), 2);
}

#[test]
fn rebuild_preserves_due_times_and_schedules_new_apps() {
    let mut r = RotationState::new();
    let t0 = Instant::now();
    r.rebuild(apps(&["a"]), t0);
    r.mark_scheduled(&id("a"), t0);
    let later = t0 + Duration::from_secs(30);
    r.rebuild(apps(&["a", "b"]), later);
    assert_eq!(r.next_render(&id("a")), Some(t0 + Duration::from_secs(300)));
    assert_eq!(r.due_renders(later), vec![id("b")]);
}

#[test]
fn duplicate_ids_are_ignored() {
    let mut r = RotationState::new();
    r.rebuild(apps(&["a", "a", "b"]), Instant::now());
    assert_eq!(r.apps(), &[id("a"), id("b")]);
}
