pub mod test_glare_rolls_back_lesser_id;
pub mod test_ice_disconnect_restarts_after_delay;
pub mod test_offer_failure_gives_up;
pub mod test_rollback_failure_reapplies_offer;
