pub mod test_offer_before_presence_creates_peer;
pub mod test_two_peers_converge;
