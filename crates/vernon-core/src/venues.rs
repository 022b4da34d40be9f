//! In-memory venue directory seeded with a handful of cities.

use crate::collaborators::{Venue, VenueDirectory};
use std::collections::HashMap;

/// Directory backed by a map of lowercase city name to venues.
#[derive(Debug, Clone, Default)]
pub struct StaticVenueDirectory {
    cities: HashMap<String, (String, Vec<Venue>)>,
}

impl StaticVenueDirectory {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Add (or replace) a city's venues.
    pub fn with_city(mut self, city: &str, venues: Vec<Venue>) -> Self {
        self.cities
            .insert(city.to_lowercase(), (city.to_string(), venues));
        self
    }

    /// Directory with the built-in sample cities.
    pub fn with_sample_data() -> Self {
        Self::empty()
            .with_city(
                "Miami",
                vec![
                    venue("Miami", "Ocean Drive Grill", "dining", "1020 Ocean Dr", 4.5, "Seafood and steaks facing the beach."),
                    venue("Miami", "Little Havana Social", "dining", "1500 SW 8th St", 4.6, "Cuban plates, live son on weekends."),
                    venue("Miami", "Wynwood Walls Lounge", "nightlife", "2520 NW 2nd Ave", 4.3, "Cocktails among the murals."),
                    venue("Miami", "Ball & Chain", "music", "1513 SW 8th St", 4.7, "Historic Latin jazz club with nightly sets."),
                    venue("Miami", "Brickell Rooftop", "nightlife", "801 Brickell Ave", 4.2, "Skyline views and DJ sets."),
                    venue("Miami", "The Steakhouse at Edgewater", "dining", "3201 Biscayne Blvd", 4.4, "Dry-aged cuts and a long wine list."),
                    venue("Miami", "Laugh Factory Miami", "comedy", "1601 Collins Ave", 4.1, "Stand-up showcases most nights."),
                ],
            )
            .with_city(
                "New York",
                vec![
                    venue("New York", "Comedy Cellar", "comedy", "117 MacDougal St", 4.8, "Legendary basement stand-up room."),
                    venue("New York", "Blue Note", "music", "131 W 3rd St", 4.7, "Jazz institution in the Village."),
                    venue("New York", "Keens Steakhouse", "dining", "72 W 36th St", 4.6, "Mutton chops under a ceiling of pipes."),
                    venue("New York", "Le Bain", "nightlife", "444 W 13th St", 4.2, "Rooftop club with a plunge pool."),
                    venue("New York", "Katz's Delicatessen", "dining", "205 E Houston St", 4.5, "Pastrami since 1888."),
                ],
            )
            .with_city(
                "Austin",
                vec![
                    venue("Austin", "Continental Club", "music", "1315 S Congress Ave", 4.7, "Live roots music every night."),
                    venue("Austin", "Franklin Barbecue", "dining", "900 E 11th St", 4.8, "Brisket worth the line."),
                    venue("Austin", "Cap City Comedy Club", "comedy", "11506 Century Oaks Ter", 4.4, "Touring headliners and open mics."),
                    venue("Austin", "Rainey Street Social", "nightlife", "70 Rainey St", 4.1, "Bungalow bars on one strip."),
                ],
            )
            .with_city(
                "Chicago",
                vec![
                    venue("Chicago", "The Second City", "comedy", "1616 N Wells St", 4.7, "Improv and sketch since 1959."),
                    venue("Chicago", "Green Mill", "music", "4802 N Broadway", 4.8, "Art deco jazz lounge."),
                    venue("Chicago", "Gibsons Bar & Steakhouse", "dining", "1028 N Rush St", 4.5, "Classic Gold Coast steakhouse."),
                ],
            )
    }
}

fn venue(city: &str, name: &str, category: &str, address: &str, rating: f32, description: &str) -> Venue {
    Venue {
        name: name.to_string(),
        city: city.to_string(),
        category: category.to_string(),
        address: address.to_string(),
        rating,
        description: description.to_string(),
    }
}

impl VenueDirectory for StaticVenueDirectory {
    fn locations_by_city(&self, city: &str) -> Vec<Venue> {
        self.cities
            .get(&city.trim().to_lowercase())
            .map(|(_, venues)| venues.clone())
            .unwrap_or_default()
    }

    fn cities(&self) -> Vec<String> {
        let mut names: Vec<String> = self.cities.values().map(|(name, _)| name.clone()).collect();
        names.sort();
        names
    }
}
