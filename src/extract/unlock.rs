//! Opening and unlocking documents.

use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::parser::PdfSource;

/// Supplies passwords for interactive unlocking.
pub trait PasswordPrompt {
    /// Ask for a password. `attempt` is 1-based; `None` means give up.
    fn prompt(&mut self, attempt: u32, max_attempts: u32) -> Option<String>;
}

impl<P: PasswordPrompt + ?Sized> PasswordPrompt for &mut P {
    fn prompt(&mut self, attempt: u32, max_attempts: u32) -> Option<String> {
        (**self).prompt(attempt, max_attempts)
    }
}

/// A fixed list of passwords tried in order.
///
/// ```
/// use pdfsift::extract::{CandidatePasswords, PasswordPrompt};
///
/// let mut prompt = CandidatePasswords::new(["old", "new"]);
/// assert_eq!(prompt.prompt(1, 3).as_deref(), Some("old"));
/// assert_eq!(prompt.prompt(2, 3).as_deref(), Some("new"));
/// assert_eq!(prompt.prompt(3, 3), None);
/// ```
#[derive(Debug, Clone)]
pub struct CandidatePasswords<I> {
    candidates: I,
}

impl<I> CandidatePasswords<I>
where
    I: Iterator,
    I::Item: Into<String>,
{
    pub fn new<T>(candidates: T) -> Self
    where
        T: IntoIterator<IntoIter = I>,
    {
        Self {
            candidates: candidates.into_iter(),
        }
    }
}

impl<I> PasswordPrompt for CandidatePasswords<I>
where
    I: Iterator,
    I::Item: Into<String>,
{
    fn prompt(&mut self, _attempt: u32, _max_attempts: u32) -> Option<String> {
        self.candidates.next().map(Into::into)
    }
}

/// An opened document, closed when dropped.
///
/// Every exit path of an extraction drops this guard, so the handle is
/// released whether the run completes, fails to unlock, or aborts.
pub struct OpenDocument<S: PdfSource> {
    source: S,
    path: PathBuf,
}

impl<S: PdfSource> OpenDocument<S> {
    pub fn new(source: S, path: &Path) -> Self {
        log::info!("PDF document opened: {}", path.display());
        Self {
            source,
            path: path.to_path_buf(),
        }
    }

    /// Single attempt with an optional password.
    ///
    /// A document that needs no password is returned unchanged, whatever
    /// `password` holds.
    pub fn unlock(&mut self, password: Option<&str>) -> Result<()> {
        if !self.source.needs_password() {
            if password.is_some() {
                log::debug!("Password supplied but not required; ignoring it");
            }
            return Ok(());
        }

        log::info!("PDF is password protected");
        let Some(password) = password else {
            log::error!("Password required but not provided");
            return Err(Error::PasswordRequired);
        };

        if self.source.authenticate(password)? {
            log::info!("PDF unlocked successfully");
            Ok(())
        } else {
            log::error!("Incorrect password provided");
            Err(Error::IncorrectPassword)
        }
    }

    /// Prompt for passwords until one works or `max_attempts` are used up.
    pub fn unlock_interactive<P>(&mut self, prompt: &mut P, max_attempts: u32) -> Result<()>
    where
        P: PasswordPrompt + ?Sized,
    {
        if !self.source.needs_password() {
            return Ok(());
        }

        log::info!("PDF is password protected");
        for attempt in 1..=max_attempts {
            let Some(password) = prompt.prompt(attempt, max_attempts) else {
                log::error!("No password given");
                return Err(Error::PasswordRequired);
            };
            if self.source.authenticate(&password)? {
                log::info!("PDF unlocked successfully");
                return Ok(());
            }
            log::warn!("Incorrect password (attempt {}/{})", attempt, max_attempts);
        }

        log::error!("Maximum password attempts exceeded");
        Err(Error::MaxAttemptsExceeded(max_attempts))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<S: PdfSource> Deref for OpenDocument<S> {
    type Target = S;

    fn deref(&self) -> &S {
        &self.source
    }
}

impl<S: PdfSource> DerefMut for OpenDocument<S> {
    fn deref_mut(&mut self) -> &mut S {
        &mut self.source
    }
}

impl<S: PdfSource> Drop for OpenDocument<S> {
    fn drop(&mut self) {
        log::info!("PDF document closed: {}", self.path.display());
    }
}
