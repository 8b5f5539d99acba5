fn main() {
    saree_tracker_lib::run()
}
