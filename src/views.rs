//! What one user gets to see of another.
//!
//! Names, year and major are public to any signed-in viewer. Contact details
//! and the bio are shown only to the user themself and to users they have an
//! accepted connection with; everyone else gets blank strings.

use std::collections::HashSet;

use serde::Serialize;

use crate::identity::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relationship {
    SelfView,
    Connected,
    Stranger,
}

impl Relationship {
    pub fn sees_contacts(self) -> bool {
        matches!(self, Relationship::SelfView | Relationship::Connected)
    }
}

/// `accepted` is the set of users the viewer has an accepted connection with.
pub fn relationship(viewer_id: i64, target_id: i64, accepted: &HashSet<i64>) -> Relationship {
    if viewer_id == target_id {
        Relationship::SelfView
    } else if accepted.contains(&target_id) {
        Relationship::Connected
    } else {
        Relationship::Stranger
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileView {
    pub id: i64,
    pub name: String,
    pub first_name: String,
    pub last_name: String,
    pub year: i64,
    pub major: String,
    pub has_profile_picture: bool,
    pub profile_picture: Option<String>,
    pub nus_email: String,
    pub phone_number: String,
    pub telegram_id: String,
    pub bio: String,
}

pub fn profile_view(user: &User, relationship: Relationship) -> ProfileView {
    let contact = |value: &str| if relationship.sees_contacts() { value.to_owned() } else { String::new() };

    ProfileView {
        id: user.id,
        name: user.name.clone(),
        first_name: user.first_name.clone(),
        last_name: user.last_name.clone(),
        year: user.year,
        major: user.major.clone(),
        has_profile_picture: user.profile_picture.is_some(),
        profile_picture: user.profile_picture.clone(),
        nus_email: contact(&user.nus_email),
        phone_number: contact(&user.phone_number),
        telegram_id: contact(&user.telegram_id),
        bio: contact(&user.bio),
    }
}

/// The signed-in user's own profile.
#[derive(Debug, Clone, Serialize)]
pub struct OwnProfileView {
    #[serde(flatten)]
    pub profile: ProfileView,
    pub is_verified: bool,
    pub is_staff: bool,
}

pub fn own_profile_view(user: &User) -> OwnProfileView {
    OwnProfileView {
        profile: profile_view(user, Relationship::SelfView),
        is_verified: user.is_verified,
        is_staff: user.is_staff,
    }
}

/// A row of a module's peer listing.
#[derive(Debug, Clone, Serialize)]
pub struct PeerView {
    #[serde(flatten)]
    pub profile: ProfileView,
    pub user_status: i64,
    pub connection_status: i64,
}

pub fn peer_view(user: &User, relationship: Relationship, user_status: i64, connection_status: i64) -> PeerView {
    PeerView { profile: profile_view(user, relationship), user_status, connection_status }
}
