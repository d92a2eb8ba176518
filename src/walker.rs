//! Iterative path descent with two reusable handles.
//!
//! [`walk_path`] hands every component of a path to a callback together with
//! the directory that should contain it. Between components the child is
//! opened into whichever of the two slots is free and the slots swap roles,
//! so any depth is walked with the caller's start directory plus two handles.

use sdcard::BlockDevice;

use crate::{
    error::FatError,
    file::{File, OpenMode},
    name::NAME_MAX,
    volume::Volume,
};


/// Splits the next component off `path`, skipping separators around it.
/// Returns the component and what is left after it.
pub fn next_component(path: &str) -> Result<(&str, &str), FatError> {
    let trimmed = path.trim_start_matches('/');
    let end = trimmed.find('/').unwrap_or(trimmed.len());
    let (component, rest) = trimmed.split_at(end);
    if component.len() > NAME_MAX {
        return Err(FatError::InvalidPath);
    }
    Ok((component, rest.trim_start_matches('/')))
}

/// Walks `path` from `start`, calling `callback(vol, parent, component,
/// is_last)` once per component. A `false` from the callback, a component
/// that cannot be opened as the next parent, or an over-long component ends
/// the walk with `false`. `start` is never closed.
pub fn walk_path<D, F>(vol: &mut Volume<D>, start: &mut File, path: &str, mut callback: F) -> bool
where
    D: BlockDevice,
    F: FnMut(&mut Volume<D>, &mut File, &str, bool) -> bool,
{
    let mut slots = [File::new(), File::new()];
    // `None` while the parent is `start`.
    let mut parent: Option<usize> = None;
    let mut rest = path;

    let walked = loop {
        let (component, remainder) = match next_component(rest) {
            Ok(split) => split,
            Err(err) => {
                log::debug!("spisd: walk_failed path={path} err={err}");
                break false;
            }
        };
        rest = remainder;
        let is_last = remainder.is_empty();

        let child_slot = if parent == Some(0) { 1 } else { 0 };
        let (dir, child) = handles(start, &mut slots, parent);
        if !callback(vol, dir, component, is_last) {
            break false;
        }
        if is_last {
            break true;
        }

        let opened = child.open(vol, dir, component, OpenMode::READ);
        if parent.is_some() {
            release(vol, dir);
        }
        match opened {
            Ok(()) => parent = Some(child_slot),
            Err(err) => {
                log::debug!("spisd: walk_missing component={component} err={err}");
                parent = None;
                break false;
            }
        }
    };

    if let Some(slot) = parent {
        release(vol, &mut slots[slot]);
    }
    walked
}

/// Current parent and the free slot for its child.
fn handles<'a>(
    start: &'a mut File,
    slots: &'a mut [File; 2],
    parent: Option<usize>,
) -> (&'a mut File, &'a mut File) {
    let [first, second] = slots;
    match parent {
        None => (start, first),
        Some(0) => (first, second),
        Some(_) => (second, first),
    }
}

/// Closes `handle`, logging a failed sync, and leaves it reset.
pub(crate) fn release<D: BlockDevice>(vol: &mut Volume<D>, handle: &mut File) {
    if let Err(err) = handle.close(vol) {
        log::warn!("spisd: close_failed err={err}");
    }
    *handle = File::new();
}

pub fn path_exists<D: BlockDevice>(vol: &mut Volume<D>, parent: &mut File, component: &str, _is_last: bool) -> bool {
    let mut child = File::new();
    if child.open(vol, parent, component, OpenMode::READ).is_err() {
        return false;
    }
    release(vol, &mut child);
    true
}

/// Creates `component` as a directory unless it already exists.
pub fn make_dir_path<D: BlockDevice>(
    vol: &mut Volume<D>,
    parent: &mut File,
    component: &str,
    _is_last: bool,
) -> bool {
    let mut child = File::new();
    if child.open(vol, parent, component, OpenMode::READ).is_ok() {
        release(vol, &mut child);
        return true;
    }
    match child.make_dir(vol, parent, component) {
        Ok(()) => {
            release(vol, &mut child);
            true
        }
        Err(err) => {
            log::debug!("spisd: mkdir_failed component={component} err={err}");
            false
        }
    }
}

pub fn remove_last<D: BlockDevice>(vol: &mut Volume<D>, parent: &mut File, component: &str, is_last: bool) -> bool {
    if !is_last {
        return true;
    }
    match File::remove_in(vol, parent, component) {
        Ok(()) => true,
        Err(err) => {
            log::debug!("spisd: remove_failed component={component} err={err}");
            false
        }
    }
}

/// Removes the directory named by the last component if it is empty.
pub fn rmdir_last<D: BlockDevice>(vol: &mut Volume<D>, parent: &mut File, component: &str, is_last: bool) -> bool {
    if !is_last {
        return true;
    }
    let mut dir = File::new();
    let removed = dir
        .open(vol, parent, component, OpenMode::READ)
        .and_then(|()| dir.rm_dir(vol));
    if let Err(err) = removed {
        log::debug!("spisd: rmdir_failed component={component} err={err}");
        release(vol, &mut dir);
        return false;
    }
    true
}
