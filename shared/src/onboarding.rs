use serde::{Deserialize, Serialize};

use crate::event::ValidationError;
use crate::model::Profile;

/// Screens a new user walks through before reaching the home tabs.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Default)]
#[serde(rename_all = "snake_case")]
pub enum OnboardingStep {
    #[default]
    GetStarted,
    SignIn,
    VerifyEmail,
    Name,
    EmergencyContact,
    Permissions,
    Home,
}

impl OnboardingStep {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::GetStarted => "get started",
            Self::SignIn => "sign in",
            Self::VerifyEmail => "verify email",
            Self::Name => "name",
            Self::EmergencyContact => "emergency contact",
            Self::Permissions => "permissions",
            Self::Home => "home",
        }
    }

    #[must_use]
    pub const fn is_home(self) -> bool {
        matches!(self, Self::Home)
    }

    /// Where a freshly signed-in user resumes, judged from what their profile
    /// already holds.
    #[must_use]
    pub fn resume_point(email_verified: bool, profile: Option<&Profile>) -> Self {
        if !email_verified {
            return Self::VerifyEmail;
        }
        match profile {
            Some(p) if p.name.trim().is_empty() => Self::Name,
            Some(p) if p.emergency_contact.is_none() => Self::EmergencyContact,
            Some(_) => Self::Home,
            None => Self::Name,
        }
    }
}

/// Tracks the current onboarding screen. Moves only forward, and only when
/// the screen's input is valid.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct Onboarding {
    step: OnboardingStep,
    email_verified: bool,
}

impl Onboarding {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn step(&self) -> OnboardingStep {
        self.step
    }

    pub fn get_started(&mut self) {
        if self.step == OnboardingStep::GetStarted {
            self.step = OnboardingStep::SignIn;
        }
    }

    pub fn signed_in(&mut self, email_verified: bool, profile: Option<&Profile>) {
        self.email_verified = email_verified;
        self.step = OnboardingStep::resume_point(email_verified, profile);
    }

    /// A fresher profile arrived. Skips screens whose data is already there
    /// but never moves backwards or past email verification.
    pub fn profile_refreshed(&mut self, profile: &Profile) {
        if self.step < OnboardingStep::Name || self.step.is_home() {
            return;
        }
        let resume = OnboardingStep::resume_point(self.email_verified, Some(profile));
        if resume > self.step {
            self.step = resume;
        }
    }

    pub fn signed_out(&mut self) {
        self.email_verified = false;
        self.step = OnboardingStep::SignIn;
    }

    pub fn set_email_verified(&mut self, verified: bool) {
        self.email_verified = verified;
    }

    pub fn continue_after_verification(&mut self) -> Result<(), ValidationError> {
        self.require_step(OnboardingStep::VerifyEmail, "continue")?;
        if !self.email_verified {
            return Err(ValidationError::EmailNotVerified);
        }
        self.step = OnboardingStep::Name;
        Ok(())
    }

    /// Name entered. Outside onboarding (settings) this is a no-op.
    pub fn name_saved(&mut self) {
        if self.step == OnboardingStep::Name {
            self.step = OnboardingStep::EmergencyContact;
        }
    }

    pub fn emergency_contact_saved(&mut self) {
        if self.step == OnboardingStep::EmergencyContact {
            self.step = OnboardingStep::Permissions;
        }
    }

    pub fn permissions_finished(&mut self) -> Result<(), ValidationError> {
        self.require_step(OnboardingStep::Permissions, "finish permissions")?;
        self.step = OnboardingStep::Home;
        Ok(())
    }

    fn require_step(
        &self,
        step: OnboardingStep,
        action: &'static str,
    ) -> Result<(), ValidationError> {
        if self.step == step {
            Ok(())
        } else {
            Err(ValidationError::OutOfOrder {
                action,
                step: self.step.label(),
            })
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Redirect {
    ToHome,
    ToSignIn,
}

/// Top-level route guard: signed-in users belong in the home tabs, signed-out
/// users never see them.
#[must_use]
pub fn guard_route(signed_in: bool, in_home_tabs: bool) -> Option<Redirect> {
    match (signed_in, in_home_tabs) {
        (true, false) => Some(Redirect::ToHome),
        (false, true) => Some(Redirect::ToSignIn),
        _ => None,
    }
}
