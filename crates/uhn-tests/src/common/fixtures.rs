// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! Configuration fixtures.

/// A realistic two-bus configuration exercising comments, defaults, and
/// every catalog feature.
pub const FULL_EDGE_CONFIG: &str = r#"{
    // Two buses: one serial chain of relay boards, one TCP I/O module.
    "buses": [
        {
            "busId": "rs485-a",
            "type": "rtu",
            "port": "/dev/ttyUSB0",
            "baud": 19200,
            "parity": "E",
            "settleBeforeRequestMs": 5,
            "settleAfterWriteMs": 10,
            "commandBufferSize": 16
        },
        {
            "busId": "lan",
            "type": "tcp",
            "tcpAddr": "10.20.0.40:502",
            "timeoutMs": 300,
            "pollIntervalMs": 500
        }
    ],
    "catalog": {
        /* Eight-relay board with a hardware toggle word. */
        "relay8": {
            "vendor": "acme",
            "model": "R8-DIN",
            "digitalOutputs": { "start": 0, "count": 8 },
            "digitalInputs": { "start": 0, "count": 8 },
            "limits": { "maxCoilsPerRead": 8, "maxInputsPerRead": 8, "maxRegistersPerRead": 8 },
            "capabilities": { "toggleWord": 21760 },
            "timings": { "settleBeforeRequestMs": 12 }
        },
        "io-mixed": {
            "vendor": "acme",
            "model": "MIX-16",
            "digitalOutputs": { "start": 0, "count": 4 },
            "digitalInputs": { "start": 16, "count": 4 },
            "analogOutputs": { "start": 0, "count": 2 },
            "analogInputs": { "start": 8, "count": 2 },
            "limits": { "maxCoilsPerRead": 2000, "maxInputsPerRead": 2000, "maxRegistersPerRead": 125 }
        }
    },
    "devices": {
        "rs485-a": [
            { "name": "relays-front", "unitId": 1, "type": "relay8" },
            { "name": "relays-back", "unitId": 2, "type": "relay8", "retryCount": 1 }
        ],
        "lan": [
            { "name": "mixer", "unitId": 1, "type": "io-mixed" }
        ]
    },
    "pollIntervalMs": 100,
    "heartbeatInterval": 2
}"#;
