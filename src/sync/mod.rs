pub mod destination_hotels;
pub mod destination_ids;
pub mod hotel_info;
pub mod seed_cities;
