use alloc::sync::Arc;

use crate::registry::{Factory, SerializeObject, Specialist, TypeRegistry};

/// A handler declared with [`inventory::submit!`].
///
/// # Examples
///
/// ```ignore
/// use std::sync::Arc;
/// use lm_graph::registry::{HandlerRegistration, RegistrationKind};
///
/// lm_graph::inventory::submit! {
///     HandlerRegistration {
///         target: "demo::Vec3",
///         kind: RegistrationKind::Handler(|| Arc::new(Vec3Handler)),
///     }
/// }
/// ```
pub struct HandlerRegistration {
    /// The type path, or the specialist name for [`RegistrationKind::Specialist`].
    pub target: &'static str,
    pub kind: RegistrationKind,
}

pub enum RegistrationKind {
    Handler(fn() -> Arc<dyn SerializeObject>),
    SubtypeHandler {
        interfaces_only: bool,
        make: fn() -> Arc<dyn SerializeObject>,
    },
    Specialist(fn() -> Arc<dyn Specialist>),
    Factory(fn() -> Arc<dyn Factory>),
}

#[cfg(feature = "auto_register")]
inventory::collect!(HandlerRegistration);

impl TypeRegistry {
    /// Applies every submitted [`HandlerRegistration`].
    ///
    /// Registrations whose target type is not registered are skipped with a
    /// warning. Returns the number applied; always zero without the
    /// `auto_register` feature.
    pub fn auto_register(&mut self) -> usize {
        #[cfg(feature = "auto_register")]
        {
            let mut applied = 0;
            for entry in inventory::iter::<HandlerRegistration> {
                if self.apply_registration(entry) {
                    applied += 1;
                }
            }
            log::debug!("auto registered {applied} handlers");
            applied
        }
        #[cfg(not(feature = "auto_register"))]
        {
            0
        }
    }

    /// Applies one registration, returning `false` if its target is unknown.
    pub fn apply_registration(&mut self, entry: &HandlerRegistration) -> bool {
        use crate::registry::{TypeTraitFactory, TypeTraitHandler};

        if let RegistrationKind::Specialist(make) = &entry.kind {
            self.insert_specialist(entry.target.into(), make());
            return true;
        }

        let Some(key) = self.intern_path(entry.target) else {
            log::warn!(
                "skipping handler registration for unknown type `{}`",
                entry.target
            );
            return false;
        };

        match &entry.kind {
            RegistrationKind::Handler(make) => {
                self.insert_type_trait(key, TypeTraitHandler::new(make()));
            }
            RegistrationKind::SubtypeHandler {
                interfaces_only,
                make,
            } => {
                self.insert_subtype_handler(key, *interfaces_only, make());
            }
            RegistrationKind::Factory(make) => {
                self.insert_type_trait(key, TypeTraitFactory::new(make()));
            }
            RegistrationKind::Specialist(_) => {}
        }
        true
    }
}
