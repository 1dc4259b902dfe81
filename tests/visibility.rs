mod support;

use std::cell::RefCell;
use std::rc::Rc;

use formcrafts_embed::{
    ElementId, HostEvent, InlineOptions, IntersectionEntry, VisibilityWatcher, WatchId,
};
use support::{embedder, make_visible, RecordingHost};

fn entry(target: ElementId, is_intersecting: bool) -> IntersectionEntry {
    IntersectionEntry {
        target,
        is_intersecting,
    }
}

#[test]
fn observer_fires_once_for_any_visible_target() {
    let embedder = embedder();
    let (hero, footer) =
        embedder.with_host_mut(|host| (host.add_element("div"), host.add_element("div")));
    let fired = Rc::new(RefCell::new(0));
    let watch = {
        let fired = Rc::clone(&fired);
        embedder.observe_visibility(&[hero, footer], move || *fired.borrow_mut() += 1)
    };

    embedder.handle_event(HostEvent::Intersection {
        watch,
        entries: vec![entry(hero, false), entry(footer, true)],
    });
    embedder.handle_event(HostEvent::Intersection {
        watch,
        entries: vec![entry(hero, true)],
    });

    assert_eq!(*fired.borrow(), 1);
    embedder.with_host(|host| {
        assert_eq!(host.disconnected, vec![watch]);
        assert!(host.observed.is_empty());
    });
}

#[test]
fn observer_waits_for_an_intersecting_entry() {
    let embedder = embedder();
    let banner = embedder.with_host_mut(|host| host.add_element("div"));
    let fired = Rc::new(RefCell::new(false));
    let watch = {
        let fired = Rc::clone(&fired);
        embedder.observe_visibility(&[banner], move || *fired.borrow_mut() = true)
    };

    embedder.handle_event(HostEvent::Intersection {
        watch,
        entries: vec![entry(banner, false)],
    });
    assert!(!*fired.borrow());

    make_visible(&embedder, banner);
    assert!(*fired.borrow());
}

#[test]
fn visibility_callback_may_create_forms() {
    let embedder = embedder();
    let target = embedder.with_host_mut(|host| host.add_element("div"));
    let created = Rc::new(RefCell::new(None));
    {
        let embedder_ref = embedder.clone();
        let created = Rc::clone(&created);
        embedder.observe_visibility(&[target], move || {
            let handle = embedder_ref.create_inline_form(InlineOptions::new("contact-us", target));
            *created.borrow_mut() = Some(handle.frame());
        });
    }

    make_visible(&embedder, target);

    let frame = created.borrow().expect("form created from callback");
    embedder.with_host(|host| assert_eq!(host.frames_in(target), vec![frame]));
}

#[test]
fn each_inline_form_has_its_own_watch() {
    let embedder = embedder();
    let (first, second) =
        embedder.with_host_mut(|host| (host.add_element("div"), host.add_element("div")));
    let a = embedder.create_inline_form(InlineOptions::new("contact-us", first));
    let b = embedder.create_inline_form(InlineOptions::new("survey", second));

    make_visible(&embedder, a.frame());

    embedder.with_host(|host| {
        assert!(host.attr(a.frame(), "src").is_some());
        assert!(host.attr(b.frame(), "src").is_none());
        assert!(host.watch_for(b.frame()).is_some());
    });
}

#[test]
fn watcher_ignores_unknown_watches_and_foreign_targets() {
    let mut host = RecordingHost::new();
    let watched = host.add_element("div");
    let other = host.add_element("div");
    let mut watcher = VisibilityWatcher::default();
    let watch = watcher.observe(&mut host, &[watched], "payload");

    assert_eq!(watcher.handle(&mut host, watch, &[entry(other, true)]), None);
    assert_eq!(
        watcher.handle(&mut host, WatchId(99), &[entry(watched, true)]),
        None
    );
    assert!(watcher.is_watching(watch));

    assert_eq!(watcher.handle(&mut host, watch, &[entry(watched, true)]), Some("payload"));
    assert!(watcher.is_empty());
}

#[test]
fn forgetting_an_element_prunes_shared_watches() {
    let mut host = RecordingHost::new();
    let a = host.add_element("div");
    let b = host.add_element("div");
    let mut watcher = VisibilityWatcher::default();
    let first = watcher.observe(&mut host, &[a], 1);
    let second = watcher.observe(&mut host, &[a, b], 2);
    let third = watcher.observe(&mut host, &[b], 3);

    watcher.forget(&mut host, a);

    assert_eq!(watcher.len(), 2);
    assert!(!watcher.is_watching(first));
    assert!(watcher.is_watching(second));
    assert!(watcher.is_watching(third));
    assert_eq!(host.disconnected, vec![first]);

    // the forgotten element no longer triggers the shared watch
    assert_eq!(watcher.handle(&mut host, second, &[entry(a, true)]), None);
    assert_eq!(watcher.handle(&mut host, second, &[entry(b, true)]), Some(2));
    assert_eq!(host.disconnected, vec![first, second]);
}

#[test]
fn destroying_a_form_keeps_user_watches_on_other_elements() {
    let embedder = embedder();
    let (container, banner) =
        embedder.with_host_mut(|host| (host.add_element("div"), host.add_element("div")));
    let form = embedder.create_inline_form(InlineOptions::new("contact-us", container));
    let frame = form.frame();
    let fired = Rc::new(RefCell::new(0));
    let watch = {
        let fired = Rc::clone(&fired);
        embedder.observe_visibility(&[frame, banner], move || *fired.borrow_mut() += 1)
    };

    form.destroy();

    embedder.with_host(|host| assert!(!host.disconnected.contains(&watch)));
    embedder.handle_event(HostEvent::Intersection {
        watch,
        entries: vec![entry(banner, true)],
    });
    assert_eq!(*fired.borrow(), 1);
    embedder.with_host(|host| assert!(host.disconnected.contains(&watch)));
}
