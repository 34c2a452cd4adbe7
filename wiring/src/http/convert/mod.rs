pub mod incoming_to_req;
