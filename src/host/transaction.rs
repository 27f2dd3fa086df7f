use super::{HostError, HostModel};
use std::ops::{Deref, DerefMut};

/// Scoped model transaction. Dropping it without `commit` rolls back, so a
/// failing operation (or a panic unwinding through it) never leaves a
/// half-applied change behind.
pub struct Transaction<'a> {
    model: &'a mut dyn HostModel,
    name: String,
    open: bool,
}

impl<'a> Transaction<'a> {
    pub fn start(model: &'a mut dyn HostModel, name: &str) -> Result<Self, HostError> {
        model.begin_transaction(name)?;
        Ok(Self {
            model,
            name: name.to_string(),
            open: true,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commit(mut self) -> Result<(), HostError> {
        self.open = false;
        if let Err(err) = self.model.commit_transaction() {
            self.model.rollback_transaction();
            return Err(err);
        }
        Ok(())
    }

    pub fn rollback(mut self) {
        self.open = false;
        self.model.rollback_transaction();
    }
}

impl<'a> Deref for Transaction<'a> {
    type Target = dyn HostModel + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.model
    }
}

impl<'a> DerefMut for Transaction<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut *self.model
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if self.open {
            self.model.rollback_transaction();
        }
    }
}
