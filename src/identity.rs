//! Mapping numeric owner and group ids to names.

/// Source of user and group names for header encoding.
///
/// Every header written by this crate carries the owner's user and group
/// names, so an id that cannot be resolved is an error rather than an empty
/// field. Implement this trait to supply names without touching the system
/// identity database.
pub trait IdentityResolver {
    /// Returns the name of the user with id `uid`, if there is one.
    fn user_name(&self, uid: u32) -> Option<String>;

    /// Returns the name of the group with id `gid`, if there is one.
    fn group_name(&self, gid: u32) -> Option<String>;
}

impl<T: IdentityResolver + ?Sized> IdentityResolver for &T {
    fn user_name(&self, uid: u32) -> Option<String> {
        (**self).user_name(uid)
    }

    fn group_name(&self, gid: u32) -> Option<String> {
        (**self).group_name(gid)
    }
}

/// Resolves names through the passwd and group databases of the host.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemIdentity;

#[cfg(unix)]
impl IdentityResolver for SystemIdentity {
    fn user_name(&self, uid: u32) -> Option<String> {
        sys::user_name(uid as libc::uid_t)
    }

    fn group_name(&self, gid: u32) -> Option<String> {
        sys::group_name(gid as libc::gid_t)
    }
}

#[cfg(not(unix))]
impl IdentityResolver for SystemIdentity {
    fn user_name(&self, _uid: u32) -> Option<String> {
        None
    }

    fn group_name(&self, _gid: u32) -> Option<String> {
        None
    }
}

#[cfg(unix)]
mod sys {
    use std::ffi::CStr;
    use std::mem;
    use std::ptr;

    const INITIAL_BUF: usize = 1024;
    const MAX_BUF: usize = 1 << 20;

    pub fn user_name(uid: libc::uid_t) -> Option<String> {
        let mut buf = vec![0 as libc::c_char; INITIAL_BUF];
        loop {
            let mut pwd: libc::passwd = unsafe { mem::zeroed() };
            let mut result = ptr::null_mut();
            let rc = unsafe {
                libc::getpwuid_r(uid, &mut pwd, buf.as_mut_ptr(), buf.len(), &mut result)
            };
            if rc == libc::ERANGE && buf.len() < MAX_BUF {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if rc != 0 || result.is_null() || pwd.pw_name.is_null() {
                return None;
            }
            let name = unsafe { CStr::from_ptr(pwd.pw_name) };
            return Some(name.to_string_lossy().into_owned());
        }
    }

    pub fn group_name(gid: libc::gid_t) -> Option<String> {
        let mut buf = vec![0 as libc::c_char; INITIAL_BUF];
        loop {
            let mut grp: libc::group = unsafe { mem::zeroed() };
            let mut result = ptr::null_mut();
            let rc = unsafe {
                libc::getgrgid_r(gid, &mut grp, buf.as_mut_ptr(), buf.len(), &mut result)
            };
            if rc == libc::ERANGE && buf.len() < MAX_BUF {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if rc != 0 || result.is_null() || grp.gr_name.is_null() {
                return None;
            }
            let name = unsafe { CStr::from_ptr(grp.gr_name) };
            return Some(name.to_string_lossy().into_owned());
        }
    }
}
